/// Transfer counters shared between an engine and whoever launched it.
/// All fields are atomic so progress can be read from another thread mid-transfer.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TransferStats {
    /// File size announced in `Start`.
    pub total_bytes: AtomicU64,
    /// Number of chunks the file splits into.
    pub total_chunks: AtomicU64,
    /// Payload bytes acknowledged (sender) or written (receiver).
    pub bytes_transferred: AtomicU64,
    pub chunks_transferred: AtomicU64,
    /// Packets sent again, for any reason.
    pub retransmits: AtomicU64,
    /// Receive calls that ended without a datagram.
    pub timeouts: AtomicU64,
    /// NACKs received (sender) or sent (receiver).
    pub nacks: AtomicU64,
    /// Out-of-sequence chunks answered with a duplicate ACK.
    pub duplicates: AtomicU64,
    /// Datagrams that failed to decode or arrived in the wrong state.
    pub discarded: AtomicU64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, bytes: u64, chunk_size: usize) {
        let chunks = bytes.div_ceil(chunk_size as u64);
        self.total_bytes.store(bytes, Ordering::Relaxed);
        self.total_chunks.store(chunks, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, bytes: usize) {
        self.bytes_transferred
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.chunks_transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Progress as a fraction 0.0 - 1.0.
    pub fn progress(&self) -> f64 {
        let total = self.total_bytes.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let done = self.bytes_transferred.load(Ordering::Relaxed);
        (done as f64 / total as f64).min(1.0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            chunks_transferred: self.chunks_transferred.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            nacks: self.nacks.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_bytes: u64,
    pub total_chunks: u64,
    pub bytes_transferred: u64,
    pub chunks_transferred: u64,
    pub retransmits: u64,
    pub timeouts: u64,
    pub nacks: u64,
    pub duplicates: u64,
    pub discarded: u64,
}
