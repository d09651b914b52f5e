//! sysfs hwmon temperature inputs (`tempN_input`, millidegrees Celsius).

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::TemperatureSensor;

#[derive(Debug)]
pub struct HwmonSensor {
    path: PathBuf,
}

impl HwmonSensor {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl TemperatureSensor for HwmonSensor {
    async fn read_temperature(&self) -> Result<f32> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let millis: i64 = raw
            .trim()
            .parse()
            .with_context(|| format!("Malformed temperature in {}", self.path.display()))?;
        Ok(millis as f32 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_millidegrees() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "45500").unwrap();

        let sensor = HwmonSensor::new(file.path().to_path_buf());
        assert_eq!(sensor.read_temperature().await.unwrap(), 45.5);
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "hot").unwrap();

        let sensor = HwmonSensor::new(file.path().to_path_buf());
        assert!(sensor.read_temperature().await.is_err());
    }
}
