//! Observability for the device runtime
//!
//! Structured logging setup and span macros.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

pub use logging::{connection_span, telemetry_span};
