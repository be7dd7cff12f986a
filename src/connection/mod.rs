//! Broker link lifecycle
//!
//! - [`manager`] - The [`ConnectionManager`]: connect with backoff, event handling, publish
//! - [`state`] - [`ConnectionState`] and transition logging
//! - [`backoff`] - Doubling backoff between connect attempts
//! - [`sleeper`] - Injectable sleeping

pub mod backoff;
pub mod manager;
pub mod sleeper;
pub mod state;

pub use backoff::BackoffState;
pub use manager::{Ack, ConnectionManager, ConnectionStats};
pub use sleeper::{Sleeper, TokioSleeper};
pub use state::ConnectionState;
