//! Transport layer for broker communication
//!
//! The connection manager only depends on the [`Transport`] capability set.
//! Outcomes of connect, publish and subscribe requests, as well as unsolicited
//! drops, are delivered asynchronously as [`TransportEvent`]s on an `mpsc`
//! channel handed out when the transport is created.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod mqtt;

/// Capacity of the transport → manager event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transport trait for broker communication
///
/// This trait abstracts the publish/subscribe client to enable dependency
/// injection and testing. Every method only *submits* a request; results
/// arrive later as events.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a new session with the broker; the outcome arrives as
    /// [`TransportEvent::ConnAck`] or [`TransportEvent::NetworkError`]
    async fn connect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic filter
    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError>;

    /// Submit a QoS 1 publish
    ///
    /// Once the packet is written, [`TransportEvent::PublishSent`] reports its
    /// packet id; the broker confirms it with a [`TransportEvent::PubAck`]
    /// carrying the same id. Publishes are sent in submission order.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// End the session gracefully
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Result code carried by a connection acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectCode {
    Accepted,
    Refused(String),
}

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker answered a connect request
    ConnAck(ConnectCode),
    /// A live session was closed by the broker
    Disconnected { reason: String },
    /// Network or protocol failure; ends the current session or attempt
    NetworkError(String),
    /// A submitted publish went out with this packet id
    PublishSent { message_id: u16 },
    /// The broker acknowledged the publish with this packet id
    PubAck { message_id: u16 },
    /// The broker acknowledged a publish with a failure reason
    PublishRejected { message_id: u16, reason: String },
    /// A subscription request was acknowledged
    SubAck { message_id: u16 },
    /// Message delivered on a subscribed filter
    MessageReceived { topic: String, payload: Bytes },
}

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker address: {0}")]
    InvalidBrokerAddress(String),
    #[error("Transport is shut down")]
    Closed,
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttTransport;
