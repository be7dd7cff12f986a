//! Random sensor readings

use crate::config::{validate_sensors, ConfigError};
use crate::protocol::{Reading, SensorSpec};
use rand::Rng;

/// Draws one reading per configured sensor from an injected RNG
pub struct SensorSampler<R: Rng> {
    specs: Vec<SensorSpec>,
    rng: R,
}

impl<R: Rng> SensorSampler<R> {
    /// Create a sampler over validated sensor descriptions
    pub fn new(specs: Vec<SensorSpec>, rng: R) -> Result<Self, ConfigError> {
        validate_sensors(&specs)?;
        Ok(Self { specs, rng })
    }

    /// One reading per sensor, in configuration order
    pub fn sample(&mut self) -> Vec<Reading> {
        let rng = &mut self.rng;
        self.specs
            .iter()
            .map(|spec| Reading {
                sensor_name: spec.name.clone(),
                value: draw(rng, spec),
            })
            .collect()
    }

    pub fn specs(&self) -> &[SensorSpec] {
        &self.specs
    }
}

fn draw<R: Rng>(rng: &mut R, spec: &SensorSpec) -> f64 {
    if spec.min_value == spec.max_value {
        spec.min_value
    } else {
        rng.gen_range(spec.min_value..=spec.max_value)
    }
}
