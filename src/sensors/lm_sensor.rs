use std::sync::{Arc, LazyLock};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lm_sensors::{
    LMSensors, SubFeatureRef,
    value::{Kind as ValueKind, Value},
};
use log::{info, warn};
use tokio::sync::Mutex;

use super::TemperatureSensor;

/// Wrapper for the lm-sensors library handle.
pub struct LMSensorsRef(pub LMSensors);

// SAFETY: lm-sensors library (>= 3.6) uses internal global mutex for all operations.
// The library is thread-safe but doesn't implement Send/Sync markers.
unsafe impl Send for LMSensorsRef {}
unsafe impl Sync for LMSensorsRef {}

/// Library handle, initialized on first use. `None` when libsensors is unavailable.
static LMSENSORS: LazyLock<Option<LMSensorsRef>> =
    LazyLock::new(|| match lm_sensors::Initializer::default().initialize() {
        Ok(sensors) => {
            info!("lm-sensors initialized successfully");
            Some(LMSensorsRef(sensors))
        }
        Err(e) => {
            warn!("lm-sensors not available: {e}");
            None
        }
    });

struct Sensor {
    subf: SubFeatureRef<'static>,
}

// SAFETY: libsensors (>= 3.6) guards all sensor access with an internal global mutex.
//         The `SubFeatureRef::value()` call is read-only.
unsafe impl Send for Sensor {}
unsafe impl Sync for Sensor {}

pub struct LmSensorSource {
    label: String,
    sensor: Mutex<Sensor>,
}

impl core::fmt::Debug for LmSensorSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LmSensorSource")
            .field("label", &self.label)
            .finish()
    }
}

impl LmSensorSource {
    /// Finds the temperature input of `feature` on `chip`.
    pub fn discover(chip: &str, feature: &str) -> Result<Arc<dyn TemperatureSensor>> {
        let lms = &LMSENSORS
            .as_ref()
            .ok_or_else(|| anyhow!("lm-sensors is not available"))?
            .0;

        let chip_ref = lms
            .chip_iter(None)
            .find(|c| c.name().map(|n| n == chip).unwrap_or(false))
            .ok_or_else(|| anyhow!("chip '{chip}' not found"))?;
        let feat_ref = chip_ref
            .feature_iter()
            .find(|f| {
                f.name()
                    .map(|n| n.unwrap_or("N/A"))
                    .map(|s| s == feature)
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("feature '{feature}' not found on chip '{chip}'"))?;
        let subf = feat_ref
            .sub_feature_iter()
            .find(|s| matches!(s.kind(), Some(ValueKind::TemperatureInput)))
            .ok_or_else(|| anyhow!("'{chip}:{feature}' has no temperature input"))?;

        info!("Found LM sensor: lm:{chip}:{feature}");
        Ok(Arc::new(LmSensorSource {
            label: format!("{chip}:{feature}"),
            sensor: Mutex::new(Sensor { subf }),
        }))
    }
}

#[async_trait]
impl TemperatureSensor for LmSensorSource {
    async fn read_temperature(&self) -> Result<f32> {
        match self.sensor.lock().await.subf.value()? {
            Value::TemperatureInput(t) => Ok(t as f32),
            _ => Err(anyhow!("non-temperature value from {}", self.label)),
        }
    }
}
