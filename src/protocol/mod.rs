//! Telemetry message types and topic validation
//!
//! This module implements the data model published by the device and the
//! validation rules applied to topics and identifiers at startup.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
