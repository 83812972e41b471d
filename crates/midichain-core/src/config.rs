//! Buffer pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest buffer size (exclusive) a pool accepts.
pub const MAX_BUFFER_SIZE: u32 = 64 * 1024;

/// Configuration for a [`BufferPool`](crate::BufferPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Number of buffers allocated up front (default: 16)
    pub buffer_count: u32,
    /// Size of each buffer in bytes, 1..65535 (default: 4096)
    pub buffer_size: u32,
    /// Refuse to reclaim buffers the transport has not prepared (default: false)
    pub require_prepared: bool,
    /// How long closing a port waits for outstanding buffers.
    /// `None` waits forever (default: 1 second)
    pub return_timeout: Option<Duration>,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_count: 16,
            buffer_size: 4096,
            require_prepared: false,
            return_timeout: Some(Duration::from_secs(1)),
        }
    }
}

impl BufferPoolConfig {
    pub fn with_buffers(count: u32, size: u32) -> Self {
        Self {
            buffer_count: count,
            buffer_size: size,
            ..Default::default()
        }
    }

    pub fn require_prepared(mut self, require: bool) -> Self {
        self.require_prepared = require;
        self
    }

    pub fn return_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.return_timeout = timeout;
        self
    }

    /// Total bytes of buffer memory this configuration allocates.
    pub fn total_bytes(&self) -> u64 {
        u64::from(self.buffer_count) * u64::from(self.buffer_size)
    }
}
