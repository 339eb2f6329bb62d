use paxos_rs::PaxosConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 128 * 1024;
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub paxos: PaxosConfig,
    /// Clock tick period. Logical time is milliseconds since start.
    pub tick_interval_ms: u64,
    /// How long `broadcast` waits for a commit before re-sending.
    pub wait_timeout_ms: u64,
    pub max_datagram_size: usize,
    pub channel_size: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            paxos: PaxosConfig::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl GroupConfig {
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    #[inline]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}
