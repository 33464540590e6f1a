/// Tunables shared by both engines.

use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::MAX_PAYLOAD_SIZE;

/// Reference receive timeout.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(1000);

/// Consecutive timeouts tolerated per phase before a transfer is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Directory the receiver writes into unless told otherwise.
pub const DEFAULT_OUTPUT_DIR: &str = "received";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArqConfig {
    /// Payload bytes per `Data` packet. The receiver rejects anything larger.
    pub chunk_size: usize,
    /// Applied to every receive call for the whole session.
    pub recv_timeout: Duration,
    pub max_retries: u32,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_PAYLOAD_SIZE,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ArqConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::ChunkSize {
                got: self.chunk_size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if self.recv_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(())
    }
}
