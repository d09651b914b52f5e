//! Construction of typed device handles from a type tag.

use std::{fmt, str::FromStr, sync::Arc};

use super::{
    Capability, Device, DeviceId,
    thermaltake::{FanDevice, LightingDevice, RgbFanDevice},
};
use crate::{
    drivers::Transport,
    error::{DaemonError, Result},
};

const FAN_ONLY: &[Capability] = &[Capability::Fan];
const LIGHTING_ONLY: &[Capability] = &[Capability::Lighting];
const FAN_AND_LIGHTING: &[Capability] = &[Capability::Fan, Capability::Lighting];

/// Recognized device models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Fan,
    RiingPlus,
    RiingTrio,
    RiingQuad,
    PurePlus,
    FloeRiingRgb,
    LumiPlus,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 7] = [
        DeviceKind::Fan,
        DeviceKind::RiingPlus,
        DeviceKind::RiingTrio,
        DeviceKind::RiingQuad,
        DeviceKind::PurePlus,
        DeviceKind::FloeRiingRgb,
        DeviceKind::LumiPlus,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Fan => "fan",
            DeviceKind::RiingPlus => "riing-plus",
            DeviceKind::RiingTrio => "riing-trio",
            DeviceKind::RiingQuad => "riing-quad",
            DeviceKind::PurePlus => "pure-plus",
            DeviceKind::FloeRiingRgb => "floe-riing-rgb",
            DeviceKind::LumiPlus => "lumi-plus",
        }
    }

    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            DeviceKind::Fan => FAN_ONLY,
            DeviceKind::LumiPlus => LIGHTING_ONLY,
            _ => FAN_AND_LIGHTING,
        }
    }

    pub const fn led_count(self) -> usize {
        match self {
            DeviceKind::Fan => 0,
            DeviceKind::RiingPlus | DeviceKind::FloeRiingRgb => 12,
            DeviceKind::RiingTrio => 30,
            DeviceKind::RiingQuad => 54,
            DeviceKind::PurePlus => 9,
            DeviceKind::LumiPlus => 10,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DaemonError::UnknownDeviceType(s.to_string()))
    }
}

/// Builds the handle for `type_tag` bound to `transport` and `id`.
///
/// Pure construction: nothing is sent over the transport.
pub fn create(transport: Arc<dyn Transport>, id: DeviceId, type_tag: &str) -> Result<Arc<dyn Device>> {
    let kind: DeviceKind = type_tag.parse()?;

    let device: Arc<dyn Device> = match kind {
        DeviceKind::Fan => Arc::new(FanDevice::new(transport, id, kind)),
        DeviceKind::LumiPlus => Arc::new(LightingDevice::new(transport, id, kind)),
        _ => Arc::new(RgbFanDevice::new(transport, id, kind)),
    };
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockTransport;
    use pretty_assertions::assert_eq;

    fn transport() -> Arc<dyn Transport> {
        // no expectations: construction must not touch the bus
        Arc::new(MockTransport::new())
    }

    #[test]
    fn every_kind_round_trips_through_its_tag() {
        for kind in DeviceKind::ALL {
            assert_eq!(kind.as_str().parse::<DeviceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn fan_tag_builds_fan_only_handle() {
        let dev = create(transport(), DeviceId::new(1), "fan").unwrap();
        assert_eq!(dev.id(), DeviceId::new(1));
        assert_eq!(dev.kind(), DeviceKind::Fan);
        assert!(dev.supports(Capability::Fan));
        assert!(!dev.supports(Capability::Lighting));
        assert!(dev.clone().fan().is_some());
        assert!(dev.lighting().is_none());
    }

    #[test]
    fn lumi_plus_is_lighting_only() {
        let dev = create(transport(), DeviceId::new(4), "lumi-plus").unwrap();
        assert!(!dev.supports(Capability::Fan));
        assert!(dev.supports(Capability::Lighting));
        assert!(dev.clone().fan().is_none());
        assert_eq!(dev.lighting().map(|l| l.led_count()), Some(10));
    }

    #[test]
    fn riing_plus_exposes_both_views() {
        let dev = create(transport(), DeviceId::new(2), "riing-plus").unwrap();
        assert_eq!(dev.capabilities(), &[Capability::Fan, Capability::Lighting]);
        let fan = dev.clone().fan().unwrap();
        let lighting = dev.lighting().unwrap();
        assert_eq!(fan.id(), lighting.id());
        assert_eq!(lighting.led_count(), 12);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = create(transport(), DeviceId::new(1), "toaster").unwrap_err();
        assert_eq!(err, DaemonError::UnknownDeviceType("toaster".into()));
    }
}
