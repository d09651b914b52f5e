//! Named temperature sources consumed by temperature-driven strategies.

pub mod hwmon;
#[cfg(feature = "lm-sensors")]
pub mod lm_sensor;

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    config::SensorCfg,
    error::{self, DaemonError},
};

#[async_trait]
pub trait TemperatureSensor: Send + Sync + core::fmt::Debug {
    /// Current temperature in °C.
    async fn read_temperature(&self) -> Result<f32>;
}

/// Sensors available to strategies, keyed by their configured id.
#[derive(Debug, Clone, Default)]
pub struct SensorSet(HashMap<String, Arc<dyn TemperatureSensor>>);

impl SensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every configured sensor.
    pub fn from_config(cfg: &[SensorCfg]) -> Result<Self> {
        let mut set = Self::new();
        for sensor in cfg {
            match sensor {
                SensorCfg::Hwmon { id, path } => {
                    set.insert(id.clone(), Arc::new(hwmon::HwmonSensor::new(path.clone())));
                }
                #[cfg(feature = "lm-sensors")]
                SensorCfg::LmSensors { id, chip, feature } => {
                    set.insert(id.clone(), lm_sensor::LmSensorSource::discover(chip, feature)?);
                }
                #[cfg(not(feature = "lm-sensors"))]
                SensorCfg::LmSensors { id, .. } => {
                    anyhow::bail!(
                        "sensor '{id}' needs lm-sensors support, rebuild with the `lm-sensors` feature"
                    );
                }
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, id: impl Into<String>, sensor: Arc<dyn TemperatureSensor>) {
        self.0.insert(id.into(), sensor);
    }

    pub fn get(&self, id: &str) -> error::Result<Arc<dyn TemperatureSensor>> {
        self.0
            .get(id)
            .cloned()
            .ok_or_else(|| DaemonError::UnknownSensor(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sensor returning a settable value.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticSensor(std::sync::Mutex<f32>);

#[cfg(test)]
impl StaticSensor {
    pub fn new(temp: f32) -> Self {
        Self(std::sync::Mutex::new(temp))
    }

    pub fn set(&self, temp: f32) {
        *self.0.lock().unwrap() = temp;
    }
}

#[cfg(test)]
#[async_trait]
impl TemperatureSensor for StaticSensor {
    async fn read_temperature(&self) -> Result<f32> {
        Ok(*self.0.lock().unwrap())
    }
}
