//! Device configuration
//!
//! The configuration is assembled once at startup by the binary (CLI flags with
//! environment fallbacks) and injected into the connection manager and the
//! telemetry loop. Sensor descriptions are read from a separate file.

use crate::protocol::{
    validate_device_id, validate_publish_topic, validate_topic_filter, SensorSpec,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BROKER: &str = "mosquitto";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_PUBLISH_TOPIC: &str = "device/data";
pub const DEFAULT_SUBSCRIBE_TOPIC: &str = "device/#";
pub const DEFAULT_DEVICE_ID: &str = "device_001";
pub const DEFAULT_SENSOR_CONFIG: &str = "config/device/device_config.json";

/// Complete device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    pub broker: BrokerSection,
    pub topics: TopicSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

/// Device identity and cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Interval between telemetry ticks in milliseconds
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
}

/// Broker endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker host name, or a full `mqtt://` / `mqtts://` URL
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Publish topic and subscription filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSection {
    pub publish: String,
    pub subscribe: String,
}

impl Default for TopicSection {
    fn default() -> Self {
        Self {
            publish: DEFAULT_PUBLISH_TOPIC.to_string(),
            subscribe: DEFAULT_SUBSCRIBE_TOPIC.to_string(),
        }
    }
}

/// Reconnection and acknowledgment timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// First backoff interval, also the value restored after a successful connect
    pub backoff_floor_ms: u64,
    /// Upper bound for the backoff interval
    pub backoff_cap_ms: u64,
    /// How long to wait for the broker's ConnAck on each attempt
    pub connect_timeout_ms: u64,
    /// How long a publish waits for its acknowledgment
    pub ack_timeout_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            backoff_floor_ms: 1_000,
            backoff_cap_ms: 60_000,
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 5_000,
        }
    }
}

fn default_publish_interval_ms() -> u64 {
    1_000
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_keep_alive_secs() -> u64 {
    60
}

/// Settings consumed by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub publish_topic: String,
    pub subscribe_topic: String,
    pub backoff_floor: Duration,
    pub backoff_cap: Duration,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let retry = RetrySection::default();
        Self {
            publish_topic: DEFAULT_PUBLISH_TOPIC.to_string(),
            subscribe_topic: DEFAULT_SUBSCRIBE_TOPIC.to_string(),
            backoff_floor: Duration::from_millis(retry.backoff_floor_ms),
            backoff_cap: Duration::from_millis(retry.backoff_cap_ms),
            connect_timeout: Duration::from_millis(retry.connect_timeout_ms),
            ack_timeout: Duration::from_millis(retry.ack_timeout_ms),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Required configuration value not set: {0}")]
    MissingValue(String),
    #[error("Invalid sensor '{name}': {reason}")]
    InvalidSensor { name: String, reason: String },
    #[error("Invalid topic: {0}")]
    InvalidTopic(#[source] ValidationError),
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(#[source] ValidationError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// TOML layout for sensor files: a list of `[[sensors]]` tables
#[derive(Debug, Deserialize)]
struct SensorFile {
    #[serde(default)]
    sensors: Vec<SensorSpec>,
}

/// Load sensor descriptions from disk
///
/// Files ending in `.toml` are read as `[[sensors]]` tables; anything else is
/// parsed as a JSON array of `{name, min_value, max_value}` records.
pub fn load_sensor_config(path: &Path) -> Result<Vec<SensorSpec>, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let sensors = if is_toml {
        toml::from_str::<SensorFile>(&content)?.sensors
    } else {
        serde_json::from_str::<Vec<SensorSpec>>(&content)?
    };

    validate_sensors(&sensors)?;
    tracing::debug!(count = sensors.len(), path = %path.display(), "Sensor configuration loaded");
    Ok(sensors)
}

/// Validate a sensor list: unique non-empty names, finite bounds, `min <= max`
pub fn validate_sensors(sensors: &[SensorSpec]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for sensor in sensors {
        let invalid = |reason: &str| ConfigError::InvalidSensor {
            name: sensor.name.clone(),
            reason: reason.to_string(),
        };

        if sensor.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if !sensor.min_value.is_finite() || !sensor.max_value.is_finite() {
            return Err(invalid("bounds must be finite numbers"));
        }
        if sensor.min_value > sensor.max_value {
            return Err(invalid("min_value is greater than max_value"));
        }
        if !(sensor.max_value - sensor.min_value).is_finite() {
            return Err(invalid("range between min_value and max_value is too wide"));
        }
        if !seen.insert(sensor.name.as_str()) {
            return Err(invalid("duplicate sensor name"));
        }
    }

    Ok(())
}

/// Read an optional value and fail when it is absent
pub fn require_value(value: Option<String>, name: &str) -> Result<String, ConfigError> {
    match value {
        Some(value) => Ok(value),
        None => {
            tracing::error!("Configuration value {} is not set", name);
            Err(ConfigError::MissingValue(name.to_string()))
        }
    }
}

impl DeviceConfig {
    /// Validate the assembled configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id).map_err(ConfigError::InvalidDeviceId)?;
        validate_publish_topic(&self.topics.publish).map_err(ConfigError::InvalidTopic)?;
        validate_topic_filter(&self.topics.subscribe).map_err(ConfigError::InvalidTopic)?;

        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::MissingValue("MQTT_BROKER".to_string()));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker port must be greater than 0".to_string(),
            ));
        }
        if self.device.publish_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish interval must be greater than 0".to_string(),
            ));
        }

        let retry = &self.retry;
        if retry.backoff_floor_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "backoff floor must be greater than 0".to_string(),
            ));
        }
        if retry.backoff_floor_ms > retry.backoff_cap_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "backoff floor {}ms exceeds cap {}ms",
                retry.backoff_floor_ms, retry.backoff_cap_ms
            )));
        }
        if retry.connect_timeout_ms == 0 || retry.ack_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect and ack timeouts must be greater than 0".to_string(),
            ));
        }

        validate_sensors(&self.sensors)
    }

    /// Settings handed to the connection manager
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            publish_topic: self.topics.publish.clone(),
            subscribe_topic: self.topics.subscribe.clone(),
            backoff_floor: Duration::from_millis(self.retry.backoff_floor_ms),
            backoff_cap: Duration::from_millis(self.retry.backoff_cap_ms),
            connect_timeout: Duration::from_millis(self.retry.connect_timeout_ms),
            ack_timeout: Duration::from_millis(self.retry.ack_timeout_ms),
        }
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.device.publish_interval_ms)
    }

    /// Copy of this configuration that is safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.broker.password = "***".to_string();
        copy
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "test-device"

[broker]
host = "localhost"
username = "user"
password = "secret"

[topics]
publish = "device/data"
subscribe = "device/#"

[[sensors]]
name = "temp"
min_value = 0.0
max_value = 100.0
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults_from_toml() {
        let config = DeviceConfig::test_config();
        assert_eq!(config.device.id, "test-device");
        assert_eq!(config.device.publish_interval_ms, 1_000);
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(config.retry, RetrySection::default());
        assert_eq!(config.sensors.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_settings_conversion() {
        let settings = DeviceConfig::test_config().connection_settings();
        assert_eq!(settings.publish_topic, "device/data");
        assert_eq!(settings.subscribe_topic, "device/#");
        assert_eq!(settings.backoff_floor, Duration::from_secs(1));
        assert_eq!(settings.backoff_cap, Duration::from_secs(60));
        assert_eq!(settings.ack_timeout, Duration::from_secs(5));
        assert_eq!(settings, ConnectionSettings::default());
    }

    #[test]
    fn test_invalid_device_id() {
        let mut config = DeviceConfig::test_config();
        config.device.id = "bad id".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_invalid_topics() {
        let mut config = DeviceConfig::test_config();
        config.topics.publish = "device/#".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopic(_))));

        let mut config = DeviceConfig::test_config();
        config.topics.subscribe = "device/#/x".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopic(_))));
    }

    #[test]
    fn test_backoff_floor_above_cap_rejected() {
        let mut config = DeviceConfig::test_config();
        config.retry.backoff_floor_ms = 120_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = DeviceConfig::test_config();
        config.device.publish_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DeviceConfig::test_config();
        config.broker.port = 0;
        assert!(config.validate().is_err());

        let mut config = DeviceConfig::test_config();
        config.retry.ack_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_sensors() {
        assert!(validate_sensors(&[]).is_ok());
        assert!(validate_sensors(&[SensorSpec::new("flat", 5.0, 5.0)]).is_ok());

        let inverted = [SensorSpec::new("temp", 10.0, 0.0)];
        assert!(matches!(
            validate_sensors(&inverted),
            Err(ConfigError::InvalidSensor { .. })
        ));

        let duplicate = [
            SensorSpec::new("temp", 0.0, 1.0),
            SensorSpec::new("temp", 0.0, 2.0),
        ];
        let err = validate_sensors(&duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let unnamed = [SensorSpec::new("  ", 0.0, 1.0)];
        assert!(validate_sensors(&unnamed).is_err());

        let infinite = [SensorSpec::new("temp", f64::NEG_INFINITY, 1.0)];
        assert!(validate_sensors(&infinite).is_err());
    }

    #[test]
    fn test_validate_sensors_rejects_overflowing_range() {
        let wide = [SensorSpec::new("wide", -1.0e308, 1.0e308)];
        match validate_sensors(&wide) {
            Err(ConfigError::InvalidSensor { name, reason }) => {
                assert_eq!(name, "wide");
                assert!(reason.contains("too wide"));
            }
            other => panic!("expected InvalidSensor, got {other:?}"),
        }

        let widest_finite = [SensorSpec::new("half", -8.0e307, 8.0e307)];
        assert!(validate_sensors(&widest_finite).is_ok());
    }

    #[test]
    fn test_require_value() {
        assert_eq!(
            require_value(Some("x".to_string()), "MQTT_USERNAME").unwrap(),
            "x"
        );
        let err = require_value(None, "MQTT_USERNAME").unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue(ref name) if name == "MQTT_USERNAME"));
    }

    #[test]
    fn test_redacted_hides_password() {
        let redacted = DeviceConfig::test_config().redacted();
        assert_eq!(redacted.broker.password, "***");
        assert_eq!(redacted.broker.username, "user");
    }

    #[test]
    fn test_load_sensor_config_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[sensors]]
name = "temp"
min_value = -10.0
max_value = 40.0

[[sensors]]
name = "humidity"
min_value = 0.0
max_value = 100.0
"#
        )
        .unwrap();

        let sensors = load_sensor_config(file.path()).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0], SensorSpec::new("temp", -10.0, 40.0));
        assert_eq!(sensors[1].name, "humidity");
    }
}
