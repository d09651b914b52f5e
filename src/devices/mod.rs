//! Device handles and their capability sets.
//!
//! A handle is bound to one [`DeviceId`], one [`DeviceKind`] and the shared
//! transport. Managers never inspect concrete types: they ask a handle whether
//! it [`supports`](Device::supports) a [`Capability`] and take the matching view
//! through [`Device::fan`] or [`Device::lighting`].

pub mod factory;
pub mod thermaltake;

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DaemonError, Result},
    lighting::LightingFrame,
};

pub use factory::{DeviceKind, create};

/// Identifier of a physical device on the bus (its controller port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawDeviceId", into = "u8")]
pub struct DeviceId(u8);

impl DeviceId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn port(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for DeviceId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<DeviceId> for u8 {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}

impl TryFrom<i64> for DeviceId {
    type Error = DaemonError;

    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map(Self)
            .map_err(|_| DaemonError::InvalidDeviceId(value.to_string()))
    }
}

impl FromStr for DeviceId {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u8>()
            .map(Self)
            .map_err(|_| DaemonError::InvalidDeviceId(s.to_string()))
    }
}

/// Ids appear in configuration either as YAML integers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeviceId {
    Int(i64),
    Str(String),
}

impl TryFrom<RawDeviceId> for DeviceId {
    type Error = DaemonError;

    fn try_from(raw: RawDeviceId) -> Result<Self> {
        match raw {
            RawDeviceId::Int(i) => Self::try_from(i),
            RawDeviceId::Str(s) => s.parse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Fan,
    Lighting,
}

/// Last reading reported by a fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanStatus {
    pub speed: u8,
    pub rpm: u16,
}

/// A device attached to the controller.
pub trait Device: Send + Sync + fmt::Debug {
    fn id(&self) -> DeviceId;

    fn kind(&self) -> DeviceKind;

    fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Fan view of this handle, if it is fan-controllable.
    fn fan(self: Arc<Self>) -> Option<Arc<dyn FanControl>> {
        None
    }

    /// Lighting view of this handle, if it is lighting-controllable.
    fn lighting(self: Arc<Self>) -> Option<Arc<dyn LightingControl>> {
        None
    }
}

#[async_trait]
pub trait FanControl: Device {
    /// Sets the duty cycle in percent (clamped to 0..=100).
    async fn set_speed(&self, percent: u8) -> Result<()>;

    async fn read_status(&self) -> Result<FanStatus>;
}

#[async_trait]
pub trait LightingControl: Device {
    /// Number of addressable LEDs.
    fn led_count(&self) -> usize;

    async fn set_lighting(&self, frame: &LightingFrame) -> Result<()>;
}
