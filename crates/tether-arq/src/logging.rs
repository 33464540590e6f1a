/// Structured transfer events.
///
/// Both engines report every protocol decision (sends, retries, rejections,
/// verdicts) through a `TransferLogger`. The default writes to `tracing`;
/// tests plug in a recorder to assert on the exact event sequence.

use std::fmt;
use std::net::SocketAddr;

use crate::error::Phase;
use crate::protocol::PacketKind;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub peer: SocketAddr,
    pub event: TransferEvent,
}

/// Why a packet was sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitReason {
    Timeout,
    Nack,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Sender: `Start` transmitted (attempt 1 is the first send).
    StartSent {
        file_name: String,
        file_size: u32,
        attempt: u32,
    },
    /// Sender: `Ack(0)` received, handshake done.
    HandshakeComplete,
    /// Sender: a chunk transmitted for the first time.
    ChunkSent { seq: u32, len: usize },
    /// Sender: chunk confirmed.
    ChunkAcked { seq: u32 },
    /// Sender: chunk rejected by the receiver.
    NackReceived { seq: u32 },
    /// A receive call ended without a usable datagram.
    Timeout {
        phase: Phase,
        seq: u32,
        consecutive: u32,
    },
    /// Sender: packet sent again.
    Retransmit {
        kind: PacketKind,
        seq: u32,
        reason: RetransmitReason,
    },
    /// Sender: reply for a sequence other than the one in flight.
    StaleReply { kind: PacketKind, seq: u32, expected: u32 },
    /// Sender: `Stop` transmitted.
    StopSent { seq: u32 },
    /// Receiver: handshake accepted, output file opened.
    StartReceived {
        file_name: String,
        file_size: u32,
        path: String,
    },
    /// Receiver: `Start` seen again after the handshake; re-acknowledged.
    StartRepeated,
    /// Receiver: chunk accepted and written.
    ChunkWritten { seq: u32, len: usize },
    /// Receiver: chunk failed its checksum.
    ChecksumMismatch { seq: u32, expected: u32, actual: u32 },
    /// Receiver: out-of-sequence chunk acknowledged with its own sequence.
    DuplicateChunk { seq: u32, expected: u32 },
    /// Receiver: `Stop` received.
    StopReceived { seq: u32, expected: u32 },
    /// Receiver: whole-file digest comparison.
    DigestVerified {
        expected: String,
        actual: String,
        matched: bool,
    },
    /// A datagram was dropped without a reply.
    Discarded { reason: String },
    /// Transfer complete.
    TransferComplete {
        total_bytes: u64,
        chunks: u32,
        retransmits: u64,
        duration_ms: u64,
    },
    /// Fatal error, the engine is about to return it.
    Error { message: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartSent { file_name, file_size, attempt } => {
                write!(f, "start_sent name={} size={} attempt={}", file_name, file_size, attempt)
            }
            Self::HandshakeComplete => write!(f, "handshake_complete"),
            Self::ChunkSent { seq, len } => write!(f, "chunk_sent seq={} len={}", seq, len),
            Self::ChunkAcked { seq } => write!(f, "chunk_acked seq={}", seq),
            Self::NackReceived { seq } => write!(f, "nack_received seq={}", seq),
            Self::Timeout { phase, seq, consecutive } => {
                write!(f, "timeout phase={} seq={} consecutive={}", phase, seq, consecutive)
            }
            Self::Retransmit { kind, seq, reason } => {
                write!(f, "retransmit kind={} seq={} reason={:?}", kind, seq, reason)
            }
            Self::StaleReply { kind, seq, expected } => {
                write!(f, "stale_reply kind={} seq={} expected={}", kind, seq, expected)
            }
            Self::StopSent { seq } => write!(f, "stop_sent seq={}", seq),
            Self::StartReceived { file_name, file_size, path } => {
                write!(f, "start_received name={} size={} path={}", file_name, file_size, path)
            }
            Self::StartRepeated => write!(f, "start_repeated"),
            Self::ChunkWritten { seq, len } => write!(f, "chunk_written seq={} len={}", seq, len),
            Self::ChecksumMismatch { seq, expected, actual } => {
                write!(f, "checksum_mismatch seq={} expected={:08x} actual={:08x}", seq, expected, actual)
            }
            Self::DuplicateChunk { seq, expected } => {
                write!(f, "duplicate_chunk seq={} expected={}", seq, expected)
            }
            Self::StopReceived { seq, expected } => {
                write!(f, "stop_received seq={} expected={}", seq, expected)
            }
            Self::DigestVerified { expected, actual, matched } => {
                write!(f, "digest_verified matched={} expected={} actual={}", matched, expected, actual)
            }
            Self::Discarded { reason } => write!(f, "discarded: {}", reason),
            Self::TransferComplete { total_bytes, chunks, retransmits, duration_ms } => {
                write!(
                    f,
                    "transfer_complete bytes={} chunks={} retransmits={} duration_ms={}",
                    total_bytes, chunks, retransmits, duration_ms
                )
            }
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect events for inspection, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // info for lifecycle events, debug for per-chunk traffic
        match &entry.event {
            TransferEvent::Error { .. } => {
                tracing::error!(component = entry.component, peer = %entry.peer, "{}", entry.event);
            }
            TransferEvent::DigestVerified { matched: false, .. } => {
                tracing::warn!(component = entry.component, peer = %entry.peer, "{}", entry.event);
            }
            TransferEvent::ChunkSent { .. }
            | TransferEvent::ChunkAcked { .. }
            | TransferEvent::ChunkWritten { .. }
            | TransferEvent::StaleReply { .. }
            | TransferEvent::DuplicateChunk { .. }
            | TransferEvent::Discarded { .. } => {
                tracing::debug!(component = entry.component, peer = %entry.peer, "{}", entry.event);
            }
            _ => {
                tracing::info!(component = entry.component, peer = %entry.peer, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
