//! Error types for the device runtime
//!
//! Only [`ConfigError`](crate::config::ConfigError) is fatal. Connect errors are
//! absorbed by the retry loop and publish errors by the telemetry loop; both are
//! logged through [`sanitize_error_message`] so broker credentials never reach
//! the log sink.

use crate::connection::ConnectionState;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single connect attempt
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Broker refused connection: {code}")]
    Refused { code: String },

    #[error("No ConnAck received within {0:?}")]
    Timeout(Duration),

    #[error("Network error while connecting: {0}")]
    Network(String),

    #[error("Transport event channel closed")]
    EventChannelClosed,
}

/// Failure of a single publish
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No acknowledgment received within {0:?}")]
    AckTimeout(Duration),

    #[error("Connection lost while waiting for acknowledgment: {0}")]
    ConnectionLost(String),

    #[error("Broker rejected message {message_id}: {reason}")]
    Rejected { message_id: u16, reason: String },

    #[error("Transport event channel closed")]
    EventChannelClosed,
}

/// Umbrella error for running the device: startup, ticks and shutdown
///
/// Connect failures never surface here; `connect_with_retry` absorbs them.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DeviceError {
    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from a lost or missing broker session
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            DeviceError::Publish(PublishError::NotConnected { .. })
                | DeviceError::Publish(PublishError::ConnectionLost(_))
                | DeviceError::Publish(PublishError::EventChannelClosed)
                | DeviceError::Transport(TransportError::Closed)
        )
    }
}

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|passwd|token|key|secret)[=:]\s*\S+").ok());

static USERINFO_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(mqtts?://)[^/@\s]+@").ok());

const MAX_MESSAGE_LEN: usize = 500;

/// Mask credentials in error text and bound its length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(pattern) = SECRET_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}=***").to_string();
    }

    // Broker URLs may embed user:password@host
    if let Some(pattern) = USERINFO_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}***@").to_string();
    }

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
