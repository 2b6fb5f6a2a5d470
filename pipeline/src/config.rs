//! Pipeline and host configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// What a producer does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Backpressure {
    /// Fail immediately and hand the item back.
    Reject,
    /// Retry up to `attempts` times, yielding between tries.
    Spin { attempts: u32 },
    /// Wait until the consumer makes room.
    #[default]
    Block,
}

/// Queue and worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of each of the four queues. Must be a nonzero power of two.
    pub queue_capacity: usize,
    /// Policy used when submitting commands from the presentation thread.
    pub backpressure: Backpressure,
    /// How long an idle worker waits on its input before rechecking its stop flag.
    pub idle_wait_ms: u64,
    /// Maximum number of idle commands the pool keeps for reuse.
    pub pool_retain: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            backpressure: Backpressure::Block,
            idle_wait_ms: 1,
            pool_retain: 256,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration suitable for testing with smaller queues.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            queue_capacity: 8,
            backpressure: Backpressure::Block,
            idle_wait_ms: 1,
            pool_retain: 16,
        }
    }

    #[must_use]
    pub const fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Checks values the queues cannot work with.
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.queue_capacity.is_power_of_two() {
            return Err(PipelineError::InvalidCapacity {
                capacity: self.queue_capacity,
            });
        }
        Ok(())
    }
}

/// Where and how the transport host is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub peer_limit: usize,
    pub channel_count: usize,
    /// Timeout passed to each transport poll; 0 returns immediately.
    pub poll_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9900,
            peer_limit: 100,
            channel_count: 100,
            poll_interval_ms: 0,
        }
    }
}

impl HostConfig {
    /// Settings for a client connecting to `host:port`.
    #[must_use]
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            peer_limit: 1,
            ..Self::default()
        }
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.backpressure, Backpressure::Block);
        assert!(config.validate().is_ok());

        let host = HostConfig::default();
        assert_eq!(host.address(), "127.0.0.1:9900");
        assert_eq!(host.peer_limit, 100);
        assert_eq!(host.channel_count, 100);
        assert_eq!(host.poll_interval(), Duration::ZERO);
    }

    #[test]
    fn testing_config_is_valid() {
        assert!(PipelineConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn non_power_of_two_capacity_is_rejected() {
        for capacity in [0, 3, 100] {
            let config = PipelineConfig {
                queue_capacity: capacity,
                ..PipelineConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(PipelineError::InvalidCapacity { capacity })
            );
        }
    }

    #[test]
    fn client_config_keeps_channel_count() {
        let client = HostConfig::client("localhost", 7000);
        assert_eq!(client.address(), "localhost:7000");
        assert_eq!(client.peer_limit, 1);
        assert_eq!(client.channel_count, 100);
    }
}
