use crate::scheduler::{ColibriPriority, OthersOnly, RoundRobin, SchedulePolicy, StrictPriority};
use crate::timestamp::{DEFAULT_CLOCK_SKEW_MS, DEFAULT_PACKET_LIFETIME_MS};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterConfigError {
    #[error("queue_size must be positive")]
    ZeroQueueSize,
    #[error("max_batch_size must be positive")]
    ZeroBatchSize,
    #[error("buffers_per_class must be positive")]
    ZeroBuffers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicyKind {
    StrictPriority,
    ColibriPriority,
    RoundRobin,
    OthersOnly,
}

impl SchedulerPolicyKind {
    pub fn build(self) -> Box<dyn SchedulePolicy> {
        match self {
            SchedulerPolicyKind::StrictPriority => Box::new(StrictPriority),
            SchedulerPolicyKind::ColibriPriority => Box::new(ColibriPriority),
            SchedulerPolicyKind::RoundRobin => Box::new(RoundRobin::new()),
            SchedulerPolicyKind::OthersOnly => Box::new(OthersOnly),
        }
    }
}

fn default_policy() -> SchedulerPolicyKind {
    SchedulerPolicyKind::StrictPriority
}

fn default_queue_size() -> usize {
    64
}

fn default_max_batch() -> usize {
    8
}

fn default_buffers_per_class() -> usize {
    64
}

fn default_buffer_bytes() -> usize {
    9216
}

fn default_lifetime_ms() -> u64 {
    DEFAULT_PACKET_LIFETIME_MS
}

fn default_skew_ms() -> u64 {
    DEFAULT_CLOCK_SKEW_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_policy")]
    pub policy: SchedulerPolicyKind,
    /// Per-class queue capacity in messages.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Upper bound on one Schedule() batch.
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,
    #[serde(default = "default_buffers_per_class")]
    pub buffers_per_class: usize,
    #[serde(default = "default_buffer_bytes")]
    pub buffer_bytes: usize,
    #[serde(default = "default_lifetime_ms")]
    pub packet_lifetime_ms: u64,
    #[serde(default = "default_skew_ms")]
    pub clock_skew_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            queue_size: default_queue_size(),
            max_batch_size: default_max_batch(),
            buffers_per_class: default_buffers_per_class(),
            buffer_bytes: default_buffer_bytes(),
            packet_lifetime_ms: default_lifetime_ms(),
            clock_skew_ms: default_skew_ms(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), RouterConfigError> {
        if self.queue_size == 0 {
            return Err(RouterConfigError::ZeroQueueSize);
        }
        if self.max_batch_size == 0 {
            return Err(RouterConfigError::ZeroBatchSize);
        }
        if self.buffers_per_class == 0 {
            return Err(RouterConfigError::ZeroBuffers);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut cfg = RouterConfig::default();
        cfg.queue_size = 0;
        assert_eq!(cfg.validate(), Err(RouterConfigError::ZeroQueueSize));

        let mut cfg = RouterConfig::default();
        cfg.max_batch_size = 0;
        assert_eq!(cfg.validate(), Err(RouterConfigError::ZeroBatchSize));
    }

    #[test]
    fn policy_kinds_build() {
        for kind in [
            SchedulerPolicyKind::StrictPriority,
            SchedulerPolicyKind::ColibriPriority,
            SchedulerPolicyKind::RoundRobin,
            SchedulerPolicyKind::OthersOnly,
        ] {
            let _ = kind.build();
        }
    }
}
