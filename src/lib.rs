//! Simulated MQTT telemetry device
//!
//! A single simulated IoT device that publishes randomized sensor readings to
//! an MQTT broker at a fixed cadence and keeps its broker link alive with
//! exponential-backoff reconnection.
//!
//! # Overview
//!
//! - [`protocol`] - Sensor descriptions, telemetry messages and topic validation
//! - [`config`] - Device configuration and sensor file loading
//! - [`transport`] - The [`Transport`](transport::Transport) capability and its `rumqttc` adapter
//! - [`connection`] - The connection manager, backoff and connection state
//! - [`telemetry`] - Sensor sampling and the publish loop
//! - [`observability`] - Structured logging setup
//!
//! # Quick Start
//!
//! ```rust
//! use device_sim::protocol::{Reading, TelemetryMessage};
//!
//! let message = TelemetryMessage::from_readings(
//!     "dev1",
//!     chrono::Utc::now(),
//!     vec![Reading { sensor_name: "temp".to_string(), value: 21.5 }],
//! );
//!
//! let payload = message.to_payload().unwrap();
//! let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
//! assert_eq!(parsed["device_id"], "dev1");
//! assert_eq!(parsed["sensor_data"]["temp"], 21.5);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ConnectionSettings, DeviceConfig};
pub use connection::{Ack, ConnectionManager, ConnectionState, TokioSleeper};
pub use error::{ConnectError, DeviceError, DeviceResult, PublishError};
pub use protocol::*;
pub use telemetry::{LoopStats, SensorSampler, TelemetryLoop};
pub use transport::mqtt::MqttTransport;
