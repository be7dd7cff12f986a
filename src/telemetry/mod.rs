//! Telemetry generation
//!
//! - [`sampler`] - One random reading per configured sensor
//! - [`runner`] - The fixed-cadence publish loop

pub mod runner;
pub mod sampler;

pub use runner::{LoopStats, TelemetryLoop};
pub use sampler::SensorSampler;
