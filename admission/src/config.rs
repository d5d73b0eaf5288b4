use colibri_base::InterfaceCapacities;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("delta must be within (0, 1], got {0}")]
    InvalidDelta(f64),
    #[error("no interface capacities configured")]
    NoCapacities,
}

fn default_delta() -> f64 {
    1.0
}

/// Admission tuning. `delta` is the maximum fraction of the free bandwidth a
/// single request may be granted. Capacities are per-interface in kbps.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default)]
    pub ingress_capacities: BTreeMap<u16, u64>,
    #[serde(default)]
    pub egress_capacities: BTreeMap<u16, u64>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { delta: default_delta(), ingress_capacities: BTreeMap::new(), egress_capacities: BTreeMap::new() }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.delta > 0.0 && self.delta <= 1.0) {
            return Err(ConfigError::InvalidDelta(self.delta));
        }
        if self.ingress_capacities.is_empty() || self.egress_capacities.is_empty() {
            return Err(ConfigError::NoCapacities);
        }
        Ok(())
    }

    pub fn capacities(&self) -> InterfaceCapacities {
        InterfaceCapacities::new(self.ingress_capacities.clone(), self.egress_capacities.clone())
    }
}
