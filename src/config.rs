//! Configuration management for the tt_rgbd daemon.
//!
//! Handles locating, loading and validating the YAML configuration file that
//! selects the transport, the fan and lighting strategies, the temperature
//! sensors and the initial set of attached devices.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    devices::{DeviceId, DeviceKind},
    error::{self, DaemonError},
};

/// Main configuration structure for the daemon.
///
/// Passed by value into [`DaemonBuilder`](crate::daemon::DaemonBuilder); there is
/// no process-wide configuration object.
///
/// # Example
///
/// ```yaml
/// version: 1
/// transport:
///   kind: hidraw
///   path: /dev/hidraw0
/// fan_tick_ms: 1000
/// lighting_tick_ms: 500
/// fan_controller:
///   kind: fixed-speed
///   speed: 50
/// lighting_controller:
///   kind: static
///   rgb: [0, 0, 255]
/// devices:
///   1: riing-plus
///   "2": lumi-plus
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Bus transport used to reach the controller.
    #[serde(default)]
    pub transport: TransportCfg,

    /// Fan loop interval in milliseconds.
    #[serde(default = "defaults::fan_tick_ms")]
    pub fan_tick_ms: u64,

    /// Lighting loop interval in milliseconds.
    #[serde(default = "defaults::lighting_tick_ms")]
    pub lighting_tick_ms: u64,

    /// Supervisory heartbeat interval in seconds.
    #[serde(default = "defaults::heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    /// Fan strategy selector.
    #[serde(default = "defaults::fan_controller")]
    pub fan_controller: StrategyCfg,

    /// Lighting strategy selector.
    #[serde(default = "defaults::lighting_controller")]
    pub lighting_controller: StrategyCfg,

    /// Temperature sensors available to strategies.
    #[serde(default)]
    pub sensors: Vec<SensorCfg>,

    /// Devices attached at startup, id -> type tag, in file order.
    #[serde(default, with = "device_list")]
    pub devices: Vec<(DeviceId, String)>,
}

/// `devices` is written as a YAML mapping but kept as a list, so two keys
/// naming the same id (`1` and `"1"`) both reach registration.
mod device_list {
    use std::fmt;

    use serde::{
        Deserializer, Serializer,
        de::{MapAccess, Visitor},
    };

    use crate::devices::DeviceId;

    pub fn serialize<S: Serializer>(
        devices: &[(DeviceId, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(devices.iter().map(|(id, tag)| (id, tag)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(DeviceId, String)>, D::Error> {
        struct DeviceListVisitor;

        impl<'de> Visitor<'de> for DeviceListVisitor {
            type Value = Vec<(DeviceId, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of device id to type tag")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut devices = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    devices.push(entry);
                }
                Ok(devices)
            }
        }

        deserializer.deserialize_map(DeviceListVisitor)
    }
}

/// Transport variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportCfg {
    /// Linux hidraw node.
    Hidraw { path: PathBuf },
    /// USB ids opened through hidapi (requires the `hid` feature).
    Hidapi { vid: u16, pid: u16 },
}

impl Default for TransportCfg {
    fn default() -> Self {
        TransportCfg::Hidraw {
            path: PathBuf::from("/dev/hidraw0"),
        }
    }
}

/// A strategy chosen by name plus its free-form parameters.
///
/// ```yaml
/// kind: curve
/// sensor: cpu
/// points: [[30, 20], [70, 100]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCfg {
    pub kind: String,

    #[serde(flatten)]
    pub params: serde_yaml::Mapping,
}

impl StrategyCfg {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_yaml::Mapping::new(),
        }
    }

    /// Adds a parameter; used when building configurations in code.
    pub fn with(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Decodes the parameters into the strategy's own parameter type.
    pub fn params<T: DeserializeOwned>(&self) -> error::Result<T> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.params.clone())).map_err(|e| {
            DaemonError::InvalidStrategyParams {
                strategy: self.kind.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Temperature sensor variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SensorCfg {
    /// sysfs `tempN_input` file.
    Hwmon { id: String, path: PathBuf },

    /// lm-sensors chip feature (requires the `lm-sensors` feature).
    LmSensors {
        id: String,
        /// Hardware chip identifier (e.g., "k10temp-pci-00c3").
        chip: String,
        /// Sensor feature name (e.g., "Tctl").
        feature: String,
    },
}

impl SensorCfg {
    pub fn id(&self) -> &str {
        match self {
            SensorCfg::Hwmon { id, .. } | SensorCfg::LmSensors { id, .. } => id,
        }
    }
}

mod defaults {
    use super::StrategyCfg;

    pub fn fan_tick_ms() -> u64 {
        1000
    }

    pub fn lighting_tick_ms() -> u64 {
        500
    }

    pub fn heartbeat_seconds() -> u64 {
        1
    }

    pub fn fan_controller() -> StrategyCfg {
        StrategyCfg::new("fixed-speed").with("speed", 50)
    }

    pub fn lighting_controller() -> StrategyCfg {
        StrategyCfg::new("off")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            transport: TransportCfg::default(),
            fan_tick_ms: defaults::fan_tick_ms(),
            lighting_tick_ms: defaults::lighting_tick_ms(),
            heartbeat_seconds: defaults::heartbeat_seconds(),
            fan_controller: defaults::fan_controller(),
            lighting_controller: defaults::lighting_controller(),
            sensors: Vec::new(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    pub fn fan_tick(&self) -> Duration {
        Duration::from_millis(self.fan_tick_ms)
    }

    pub fn lighting_tick(&self) -> Duration {
        Duration::from_millis(self.lighting_tick_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Validates the configuration for consistency.
    ///
    /// Strategy names and parameters are checked later, when the daemon
    /// builds the strategies.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }
        if self.fan_tick_ms == 0 || self.lighting_tick_ms == 0 || self.heartbeat_seconds == 0 {
            anyhow::bail!("Loop intervals must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.id()) {
                anyhow::bail!("Sensor '{}' is defined more than once", sensor.id());
            }
        }

        for (id, tag) in &self.devices {
            tag.parse::<DeviceKind>()
                .with_context(|| format!("Device {id} has an invalid type"))?;
        }

        Ok(())
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. TT_RGBD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/tt_rgbd/config.yml or ~/.config/tt_rgbd/config.yml
    /// 4. /etc/tt_rgbd/config.yml
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        Self::load_from_path(&config_path)
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

fn locate_config() -> Result<PathBuf> {
    if let Ok(env_path) = env::var("TT_RGBD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("tt_rgbd/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    let etc = Path::new("/etc/tt_rgbd/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn config_load_valid_yaml() {
        let temp_file = create_temp_config(
            r#"
version: 1
transport:
  kind: hidapi
  vid: 0x264a
  pid: 0x1fa5
fan_tick_ms: 250
lighting_tick_ms: 100
fan_controller:
  kind: curve
  sensor: cpu
  points: [[30, 20], [70, 100]]
lighting_controller:
  kind: static
  rgb: [0, 0, 255]
sensors:
  - kind: hwmon
    id: cpu
    path: /sys/class/hwmon/hwmon0/temp1_input
devices:
  1: riing-plus
  "2": lumi-plus
"#,
        );

        let config = Config::load(Some(temp_file.path().to_path_buf())).unwrap();

        assert_eq!(config.version, 1);
        assert_eq!(
            config.transport,
            TransportCfg::Hidapi {
                vid: 0x264a,
                pid: 0x1fa5
            }
        );
        assert_eq!(config.fan_tick(), Duration::from_millis(250));
        assert_eq!(config.lighting_tick(), Duration::from_millis(100));
        assert_eq!(config.heartbeat(), Duration::from_secs(1));
        assert_eq!(config.fan_controller.kind, "curve");
        assert_eq!(config.lighting_controller.kind, "static");
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(
            config.devices,
            vec![
                (DeviceId::new(1), "riing-plus".to_string()),
                (DeviceId::new(2), "lumi-plus".to_string()),
            ]
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let temp_file = create_temp_config("version: 1\n");
        let config = Config::load(Some(temp_file.path().to_path_buf())).unwrap();

        assert_eq!(config.transport, TransportCfg::default());
        assert_eq!(config.fan_controller, defaults::fan_controller());
        assert_eq!(config.lighting_controller.kind, "off");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn strategy_params_decode() {
        #[derive(Deserialize)]
        struct Speed {
            speed: u8,
        }

        let cfg: StrategyCfg = serde_yaml::from_str("kind: fixed-speed\nspeed: 70\n").unwrap();
        assert_eq!(cfg.params::<Speed>().unwrap().speed, 70);
    }

    #[test]
    fn strategy_params_mismatch_is_reported() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Speed {
            speed: u8,
        }

        let cfg = StrategyCfg::new("fixed-speed").with("speed", "fast");
        let err = cfg.params::<Speed>().unwrap_err();
        assert!(matches!(
            err,
            DaemonError::InvalidStrategyParams { ref strategy, .. } if strategy == "fixed-speed"
        ));
    }

    #[test]
    fn unsupported_version_rejected() {
        let temp_file = create_temp_config("version: 2\n");
        let err = Config::load(Some(temp_file.path().to_path_buf())).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported config version 2"));
    }

    #[test]
    fn unknown_device_type_rejected() {
        let config = Config {
            devices: vec![(DeviceId::new(1), "toaster".to_string())],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("toaster"));
    }

    #[test]
    fn same_id_spelled_twice_is_kept_twice() {
        let temp_file = create_temp_config("version: 1\ndevices:\n  1: fan\n  \"1\": riing-plus\n");
        let config = Config::load(Some(temp_file.path().to_path_buf())).unwrap();

        assert_eq!(
            config.devices,
            vec![
                (DeviceId::new(1), "fan".to_string()),
                (DeviceId::new(1), "riing-plus".to_string()),
            ]
        );
    }

    #[test]
    fn devices_serialize_as_a_mapping() {
        let config = Config {
            devices: vec![(DeviceId::new(3), "riing-quad".to_string())],
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("3: riing-quad"));

        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.devices, config.devices);
    }

    #[test]
    fn negative_device_id_rejected() {
        let temp_file = create_temp_config("version: 1\ndevices:\n  -1: fan\n");
        assert!(Config::load(Some(temp_file.path().to_path_buf())).is_err());
    }

    #[test]
    fn duplicate_sensor_ids_rejected() {
        let sensor = SensorCfg::Hwmon {
            id: "cpu".into(),
            path: PathBuf::from("/tmp/t"),
        };
        let config = Config {
            sensors: vec![sensor.clone(), sensor],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = Config {
            fan_tick_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_variable_takes_precedence() {
        let temp_file = create_temp_config("version: 1\nfan_tick_ms: 42\n");
        // SAFETY: serialized with the other env-dependent tests.
        unsafe { env::set_var("TT_RGBD_CONFIG", temp_file.path()) };
        let config = Config::load(None);
        unsafe { env::remove_var("TT_RGBD_CONFIG") };

        assert_eq!(config.unwrap().fan_tick_ms, 42);
    }

    #[test]
    #[serial]
    fn xdg_config_home_is_searched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tt_rgbd")).unwrap();
        fs::write(dir.path().join("tt_rgbd/config.yml"), "version: 1\n").unwrap();

        // SAFETY: serialized with the other env-dependent tests.
        unsafe {
            env::remove_var("TT_RGBD_CONFIG");
            env::set_var("XDG_CONFIG_HOME", dir.path());
        }
        let located = locate_config();
        unsafe { env::remove_var("XDG_CONFIG_HOME") };

        assert_eq!(located.unwrap(), dir.path().join("tt_rgbd/config.yml"));
    }
}
