use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::EncodeError;

/// Protocol phase a retry budget or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sender waiting for `Ack(0)` after `Start`.
    Handshake,
    /// Sender waiting for the reply to a `Data` packet.
    Chunk,
    /// Receiver waiting for the first `Start`.
    AwaitingStart,
    /// Receiver waiting for the next `Data` or `Stop`.
    Receiving,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Chunk => "chunk",
            Self::AwaitingStart => "awaiting start",
            Self::Receiving => "receiving",
        };
        f.write_str(name)
    }
}

/// Fatal transfer failures. Everything recoverable is handled inside the engines.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{phase} aborted at seq {seq} after {attempts} consecutive timeouts")]
    RetriesExhausted { phase: Phase, seq: u32, attempts: u32 },

    #[error("cannot open {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file is {0} bytes, the wire format carries at most {max}", max = u32::MAX)]
    FileTooLarge(u64),

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("cannot encode packet: {0}")]
    Encode(#[from] EncodeError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Rejected `ArqConfig` values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chunk size must be between 1 and {max}, got {got}")]
    ChunkSize { got: usize, max: usize },
    #[error("receive timeout must be non-zero")]
    ZeroTimeout,
    #[error("retry budget must be at least 1")]
    ZeroRetries,
}
