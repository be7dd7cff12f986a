//! Telemetry data model and wire payload
//!
//! This module defines the sensor description loaded at startup, the
//! per-tick reading, and the telemetry message published to the broker.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of one simulated sensor
///
/// Loaded once at startup and never mutated afterwards. Values are drawn
/// uniformly from the closed range `[min_value, max_value]`.
///
/// # Examples
/// ```
/// use device_sim::protocol::SensorSpec;
///
/// let spec: SensorSpec =
///     serde_json::from_str(r#"{"name": "temp", "min_value": 0.0, "max_value": 100.0}"#).unwrap();
/// assert_eq!(spec.name, "temp");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSpec {
    /// Sensor name, unique per device
    pub name: String,
    /// Lower bound (inclusive)
    pub min_value: f64,
    /// Upper bound (inclusive)
    pub max_value: f64,
}

impl SensorSpec {
    pub fn new<S: Into<String>>(name: S, min_value: f64, max_value: f64) -> Self {
        Self {
            name: name.into(),
            min_value,
            max_value,
        }
    }

    /// Check whether a value lies inside this sensor's range
    pub fn contains(&self, value: f64) -> bool {
        self.min_value <= value && value <= self.max_value
    }
}

/// A single sampled value, produced once per tick and never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_name: String,
    pub value: f64,
}

/// Telemetry message published once per tick
///
/// Serializes to:
///
/// ```json
/// {
///   "timestamp": "2024-01-01T00:00:00.123456+00:00",
///   "device_id": "device_001",
///   "sensor_data": {"humidity": 41.2, "temp": 21.7}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryMessage {
    /// Sampling instant in UTC
    #[serde(with = "iso8601_micros")]
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    /// One entry per configured sensor, keyed by sensor name
    pub sensor_data: BTreeMap<String, f64>,
}

impl TelemetryMessage {
    /// Assemble a message from one tick's readings
    pub fn from_readings<S: Into<String>>(
        device_id: S,
        timestamp: DateTime<Utc>,
        readings: Vec<Reading>,
    ) -> Self {
        let sensor_data = readings
            .into_iter()
            .map(|reading| (reading.sensor_name, reading.value))
            .collect();

        Self {
            timestamp,
            device_id: device_id.into(),
            sensor_data,
        }
    }

    /// Serialize into the UTF-8 JSON wire payload
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parse a wire payload back into a message
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// ISO-8601 timestamps with microsecond precision and an explicit `+00:00` offset
mod iso8601_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Micros, false))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
