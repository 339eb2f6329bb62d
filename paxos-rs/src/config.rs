//! Timing knobs, in logical-time units.

use px_data::LogicalTime;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HEARTBEAT_INTERVAL: LogicalTime = 1000;
pub const DEFAULT_FAILURE_TIMEOUT: LogicalTime = 3000;
pub const DEFAULT_RESEND_INTERVAL: LogicalTime = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaxosConfig {
    pub heartbeat_interval: LogicalTime,
    pub failure_timeout: LogicalTime,
    pub resend_interval: LogicalTime,
}

impl Default for PaxosConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            failure_timeout: DEFAULT_FAILURE_TIMEOUT,
            resend_interval: DEFAULT_RESEND_INTERVAL,
        }
    }
}
