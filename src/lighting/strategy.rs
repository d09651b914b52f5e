//! Lighting strategies and the name-keyed factory that builds them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::{LightingFrame, LightingMode, color::Rgb};
use crate::{
    config::StrategyCfg,
    devices::DeviceId,
    error::{self, DaemonError},
    sensors::{SensorSet, TemperatureSensor},
};

/// Produces the frame each lighting device shows on a given tick.
#[async_trait]
pub trait LightingStrategy: Send + Sync + core::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Frame for `device` at `tick`, sized to `led_count` LEDs.
    async fn frame_for(&self, tick: u64, device: DeviceId, led_count: usize) -> Result<LightingFrame>;
}

/// Builds the strategy named by `cfg.kind`: `static`, `off`, `alternating`,
/// `spectrum` or `temperature`.
pub fn lighting_strategy_factory(
    cfg: &StrategyCfg,
    sensors: &SensorSet,
) -> error::Result<Arc<dyn LightingStrategy>> {
    Ok(match cfg.kind.as_str() {
        "static" => {
            let StaticParams { rgb } = cfg.params()?;
            Arc::new(StaticColor::new(rgb))
        }
        "off" => Arc::new(Off),
        "alternating" => {
            let AlternatingParams { odd_rgb, even_rgb } = cfg.params()?;
            Arc::new(Alternating::new(odd_rgb, even_rgb))
        }
        "spectrum" => {
            let SpectrumParams { step } = cfg.params()?;
            if !(step.is_finite() && step > 0.0) {
                return Err(DaemonError::InvalidStrategyParams {
                    strategy: cfg.kind.clone(),
                    reason: format!("step must be a positive number of degrees, got {step}"),
                });
            }
            Arc::new(Spectrum { step })
        }
        "temperature" => {
            let TemperatureParams {
                sensor,
                cold,
                target,
                hot,
            } = cfg.params()?;
            if !(cold < target && target < hot) {
                return Err(DaemonError::InvalidStrategyParams {
                    strategy: cfg.kind.clone(),
                    reason: format!("expected cold < target < hot, got {cold}/{target}/{hot}"),
                });
            }
            Arc::new(Temperature {
                sensor: sensors.get(&sensor)?,
                cold,
                target,
                hot,
            })
        }
        other => return Err(DaemonError::UnknownControllerStrategy(other.to_string())),
    })
}

#[derive(Deserialize)]
struct StaticParams {
    rgb: Rgb,
}

#[derive(Deserialize)]
struct AlternatingParams {
    odd_rgb: Rgb,
    even_rgb: Rgb,
}

#[derive(Deserialize)]
struct SpectrumParams {
    #[serde(default = "default_step")]
    step: f32,
}

fn default_step() -> f32 {
    10.0
}

#[derive(Deserialize)]
struct TemperatureParams {
    sensor: String,
    cold: f32,
    target: f32,
    hot: f32,
}

#[derive(Debug)]
pub struct StaticColor {
    color: Rgb,
}

impl StaticColor {
    pub fn new(color: Rgb) -> Self {
        Self { color }
    }
}

#[async_trait]
impl LightingStrategy for StaticColor {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn frame_for(&self, _tick: u64, _device: DeviceId, led_count: usize) -> Result<LightingFrame> {
        Ok(LightingFrame::uniform(LightingMode::Full, self.color, led_count))
    }
}

/// All LEDs dark.
#[derive(Debug)]
pub struct Off;

#[async_trait]
impl LightingStrategy for Off {
    fn name(&self) -> &'static str {
        "off"
    }

    async fn frame_for(&self, _tick: u64, _device: DeviceId, led_count: usize) -> Result<LightingFrame> {
        Ok(LightingFrame::uniform(LightingMode::Full, Rgb::BLACK, led_count))
    }
}

/// Odd and even LEDs (1-based) in two colors, swapped on every tick.
#[derive(Debug)]
pub struct Alternating {
    odd: Rgb,
    even: Rgb,
}

impl Alternating {
    pub fn new(odd: Rgb, even: Rgb) -> Self {
        Self { odd, even }
    }
}

#[async_trait]
impl LightingStrategy for Alternating {
    fn name(&self) -> &'static str {
        "alternating"
    }

    async fn frame_for(&self, tick: u64, _device: DeviceId, led_count: usize) -> Result<LightingFrame> {
        let colors = (0..led_count)
            .map(|i| {
                if (i as u64 + tick) % 2 == 0 {
                    self.odd
                } else {
                    self.even
                }
            })
            .collect();
        Ok(LightingFrame::new(LightingMode::PerLed, colors))
    }
}

/// Rotates the hue by `step` degrees per tick.
#[derive(Debug)]
pub struct Spectrum {
    step: f32,
}

#[async_trait]
impl LightingStrategy for Spectrum {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    async fn frame_for(&self, tick: u64, _device: DeviceId, led_count: usize) -> Result<LightingFrame> {
        let hue = ((tick as f64 * f64::from(self.step)) % 360.0) as f32;
        Ok(LightingFrame::uniform(LightingMode::Full, Rgb::from_hue(hue), led_count))
    }
}

/// Blue when cold, green at target, red when hot.
#[derive(Debug)]
pub struct Temperature {
    sensor: Arc<dyn TemperatureSensor>,
    cold: f32,
    target: f32,
    hot: f32,
}

impl Temperature {
    fn color_at(&self, temp: f32) -> Rgb {
        if temp <= self.target {
            let t = (temp - self.cold) / (self.target - self.cold);
            Rgb::BLUE.lerp(Rgb::GREEN, t)
        } else {
            let t = (temp - self.target) / (self.hot - self.target);
            Rgb::GREEN.lerp(Rgb::RED, t)
        }
    }
}

#[async_trait]
impl LightingStrategy for Temperature {
    fn name(&self) -> &'static str {
        "temperature"
    }

    async fn frame_for(&self, _tick: u64, _device: DeviceId, led_count: usize) -> Result<LightingFrame> {
        let temp = self.sensor.read_temperature().await?;
        Ok(LightingFrame::uniform(LightingMode::Full, self.color_at(temp), led_count))
    }
}
