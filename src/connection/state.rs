//! Connection state and transition logging

use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Lifecycle of the broker link as seen by the connection manager
///
/// There is no terminal state: `Failed` always returns to `Disconnected`
/// after the backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Log a connection state transition (pure logging function)
pub fn log_state_transition(from: ConnectionState, to: ConnectionState, detail: &str) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("Connected to broker");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            warn!(reason = %detail, "Connection to broker lost");
        }
        (_, ConnectionState::Failed) => {
            error!(reason = %detail, "Connection attempt failed");
        }
        _ => {
            tracing::debug!("Connection state: {} -> {}", from, to);
        }
    }
}
