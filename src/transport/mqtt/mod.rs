//! MQTT transport built on `rumqttc`
//!
//! Split the same way as the rest of the transport code: pure functions apart
//! from I/O.
//!
//! - [`connection`] - Pure option building and broker address parsing
//! - [`message_handler`] - Pure translation of `rumqttc` events into [`TransportEvent`]s
//! - [`client`] - Impure I/O: the client handle and the event loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use device_sim::config::BrokerSection;
//! use device_sim::transport::mqtt::MqttTransport;
//! use device_sim::transport::Transport;
//!
//! # tokio_test::block_on(async {
//! let broker = BrokerSection {
//!     host: "localhost".to_string(),
//!     port: 1883,
//!     username: "device".to_string(),
//!     password: "secret".to_string(),
//!     keep_alive_secs: 60,
//! };
//!
//! let (transport, mut events) = MqttTransport::new("device_001", &broker)?;
//! transport.connect().await?;
//! let first_event = events.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! [`TransportEvent`]: crate::transport::TransportEvent

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::{configure_mqtt_options, parse_broker_address, BrokerEndpoint};
pub use message_handler::{EventRoute, MessageHandler};
