//! Error taxonomy for the device orchestration engine.

use thiserror::Error;

use crate::devices::DeviceId;

/// Errors raised by the daemon core.
///
/// Configuration and input errors are returned synchronously from the call that
/// introduced the bad value. `DeviceWrite` is produced inside manager ticks and is
/// never propagated out of a worker; it is logged and published on the event bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DaemonError {
    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),

    #[error("unknown controller strategy '{0}'")]
    UnknownControllerStrategy(String),

    #[error("invalid parameters for strategy '{strategy}': {reason}")]
    InvalidStrategyParams { strategy: String, reason: String },

    #[error("unknown temperature sensor '{0}'")]
    UnknownSensor(String),

    #[error("invalid device id '{0}'")]
    InvalidDeviceId(String),

    #[error("device {0} is already registered")]
    DuplicateDevice(DeviceId),

    #[error("write to device {device} failed: {reason}")]
    DeviceWrite { device: DeviceId, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot {operation} while {state}")]
    LifecycleViolation {
        operation: &'static str,
        state: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, DaemonError>;

impl DaemonError {
    pub(crate) fn device_write(device: DeviceId, reason: impl ToString) -> Self {
        Self::DeviceWrite {
            device,
            reason: reason.to_string(),
        }
    }
}
