//! Testing utilities and mock implementations
//!
//! Lets the connection manager and telemetry loop run without an MQTT broker
//! or wall-clock delays.

pub mod mocks;

pub use mocks::*;
