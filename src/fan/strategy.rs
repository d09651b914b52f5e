//! Fan-control strategies and the name-keyed factory that builds them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::curve::{FanCurve, Point};
use crate::{
    config::StrategyCfg,
    devices::DeviceId,
    error::{self, DaemonError},
    sensors::{SensorSet, TemperatureSensor},
};

/// Decides, per tick, the duty cycle of each attached fan.
#[async_trait]
pub trait FanStrategy: Send + Sync + core::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Target speed in percent for `device`.
    async fn speed_for(&self, device: DeviceId) -> Result<u8>;
}

/// Builds the strategy named by `cfg.kind`.
///
/// Known names: `fixed-speed` (alias `locked-speed`), `curve`, `bezier`,
/// `temp-target`.
pub fn fan_strategy_factory(cfg: &StrategyCfg, sensors: &SensorSet) -> error::Result<Arc<dyn FanStrategy>> {
    let invalid = |reason: String| DaemonError::InvalidStrategyParams {
        strategy: cfg.kind.clone(),
        reason,
    };

    Ok(match cfg.kind.as_str() {
        "fixed-speed" | "locked-speed" => {
            let FixedSpeedParams { speed } = cfg.params()?;
            if speed > 100 {
                return Err(invalid(format!("speed {speed} is outside 0..=100")));
            }
            Arc::new(FixedSpeed { speed })
        }
        "curve" => {
            let CurveParams { sensor, points } = cfg.params()?;
            Arc::new(CurveStrategy {
                name: "curve",
                sensor: sensors.get(&sensor)?,
                curve: FanCurve::linear(points).map_err(invalid)?,
            })
        }
        "bezier" => {
            let CurveParams { sensor, points } = cfg.params()?;
            Arc::new(CurveStrategy {
                name: "bezier",
                sensor: sensors.get(&sensor)?,
                curve: FanCurve::bezier(points).map_err(invalid)?,
            })
        }
        "temp-target" => {
            let TempTargetParams {
                sensor,
                target,
                multiplier,
            } = cfg.params()?;
            Arc::new(TempTarget {
                sensor: sensors.get(&sensor)?,
                target,
                multiplier,
            })
        }
        other => return Err(DaemonError::UnknownControllerStrategy(other.to_string())),
    })
}

#[derive(Deserialize)]
struct FixedSpeedParams {
    speed: u8,
}

#[derive(Deserialize)]
struct CurveParams {
    sensor: String,
    points: Vec<Point>,
}

#[derive(Deserialize)]
struct TempTargetParams {
    sensor: String,
    target: f32,
    #[serde(default = "default_multiplier")]
    multiplier: f32,
}

fn default_multiplier() -> f32 {
    5.0
}

/// Same speed for every fan, always.
#[derive(Debug)]
pub struct FixedSpeed {
    speed: u8,
}

impl FixedSpeed {
    pub fn new(speed: u8) -> Self {
        Self {
            speed: speed.min(100),
        }
    }
}

#[async_trait]
impl FanStrategy for FixedSpeed {
    fn name(&self) -> &'static str {
        "fixed-speed"
    }

    async fn speed_for(&self, _device: DeviceId) -> Result<u8> {
        Ok(self.speed)
    }
}

/// Speed from a curve over one sensor.
#[derive(Debug)]
pub struct CurveStrategy {
    name: &'static str,
    sensor: Arc<dyn TemperatureSensor>,
    curve: FanCurve,
}

#[async_trait]
impl FanStrategy for CurveStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn speed_for(&self, _device: DeviceId) -> Result<u8> {
        let temp = self.sensor.read_temperature().await?;
        Ok(self.curve.speed_at(temp))
    }
}

/// Proportional controller: `(temp - target) * multiplier`, clamped to 0..=100.
#[derive(Debug)]
pub struct TempTarget {
    sensor: Arc<dyn TemperatureSensor>,
    target: f32,
    multiplier: f32,
}

#[async_trait]
impl FanStrategy for TempTarget {
    fn name(&self) -> &'static str {
        "temp-target"
    }

    async fn speed_for(&self, _device: DeviceId) -> Result<u8> {
        let temp = self.sensor.read_temperature().await?;
        Ok(((temp - self.target) * self.multiplier).round().clamp(0.0, 100.0) as u8)
    }
}
