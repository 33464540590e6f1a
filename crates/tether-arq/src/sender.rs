/// Stop-and-wait sender.
///
/// ```text
/// AwaitingStartAck ──Ack(0)──> SendingChunk(seq) ──> AwaitingChunkAck(seq)
///        │                          │   ^                    │
///   timeout: resend START           │   └──── Ack(seq) ──────┤
///                                   │         Nack(seq): resend now
///                                  EOF        timeout:   resend
///                                   v
///                             STOP sent once ──> Done
/// ```
///
/// Fifteen consecutive timeouts in one phase abort the transfer. NACKs and
/// matching ACKs restore the budget; replies for other sequences do not.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::ArqConfig;
use crate::digest::file_sha256;
use crate::error::{Phase, TransferError};
use crate::logging::{RetransmitReason, TransferEvent, TransferLogger};
use crate::protocol::{encode_packet, DataPacket, Packet, PacketKind, StartDescriptor};
use crate::session::{Endpoint, Incoming};
use crate::stats::TransferStats;
use crate::transport::Transport;

/// Configuration for the sender.
pub struct SenderConfig {
    pub file_path: PathBuf,
    pub peer_addr: SocketAddr,
    pub arq: ArqConfig,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

/// Result of a completed send operation.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub file_name: String,
    pub file_size: u64,
    pub file_sha256: String,
    /// Chunks acknowledged; also the sequence carried by `Stop`.
    pub chunks: u32,
    pub retransmits: u64,
    pub elapsed: Duration,
}

/// Push one file to the peer. Blocks until `Stop` is sent or the retry
/// budget runs out.
pub fn run_sender<T: Transport>(
    config: SenderConfig,
    transport: T,
    stats: Arc<TransferStats>,
) -> Result<SendResult, TransferError> {
    config.arq.validate()?;

    let path = config.file_path.as_path();
    let file_name = advertised_name(path)?;
    let file = File::open(path).map_err(|source| TransferError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let file_size = file.metadata()?.len();
    let wire_size = u32::try_from(file_size).map_err(|_| TransferError::FileTooLarge(file_size))?;
    let sha256 = file_sha256(path).map_err(|source| TransferError::File {
        path: path.to_path_buf(),
        source,
    })?;

    stats.set_total(file_size, config.arq.chunk_size);

    let mut endpoint = Endpoint::new(
        "sender",
        transport,
        config.peer_addr,
        config.logger,
        stats.clone(),
        config.arq.max_retries,
    );

    let start = Instant::now();
    let descriptor = StartDescriptor {
        file_size: wire_size,
        sha256: sha256.clone(),
        file_name: file_name.clone(),
    };
    handshake(&mut endpoint, &descriptor)?;

    let mut input = BufReader::new(file);
    let mut seq: u32 = 0;
    loop {
        let payload = read_chunk(&mut input, config.arq.chunk_size)?;
        if payload.is_empty() {
            break;
        }
        deliver_chunk(&mut endpoint, seq, payload)?;
        seq += 1;
    }

    // Best effort, no reply expected.
    endpoint.send_packet(&Packet::Stop { seq });
    endpoint.emit(TransferEvent::StopSent { seq });

    let elapsed = start.elapsed();
    let retransmits = stats.snapshot().retransmits;
    endpoint.emit(TransferEvent::TransferComplete {
        total_bytes: file_size,
        chunks: seq,
        retransmits,
        duration_ms: elapsed.as_millis() as u64,
    });

    Ok(SendResult {
        file_name,
        file_size,
        file_sha256: sha256,
        chunks: seq,
        retransmits,
        elapsed,
    })
}

/// Send `Start` until the receiver answers `Ack(0)`.
fn handshake<T: Transport>(
    endpoint: &mut Endpoint<T>,
    descriptor: &StartDescriptor,
) -> Result<(), TransferError> {
    let packet = encode_packet(&Packet::Start(descriptor.clone()));
    let mut attempt = 1;

    endpoint.send(&packet);
    endpoint.emit(TransferEvent::StartSent {
        file_name: descriptor.file_name.clone(),
        file_size: descriptor.file_size,
        attempt,
    });

    loop {
        match endpoint.recv() {
            Incoming::Packet(Packet::Ack { seq: 0 }) => {
                endpoint.reset_budget();
                endpoint.emit(TransferEvent::HandshakeComplete);
                return Ok(());
            }
            // Keep waiting for the pending timeout, no resend.
            Incoming::Packet(other) => {
                endpoint.discard(format!("unexpected {} during handshake", other.kind()));
            }
            Incoming::Malformed(e) => endpoint.discard(e.to_string()),
            Incoming::Silence => {
                endpoint.timeout(Phase::Handshake, 0)?;
                attempt += 1;
                endpoint.send(&packet);
                TransferStats::bump(&endpoint.stats.retransmits);
                endpoint.emit(TransferEvent::Retransmit {
                    kind: PacketKind::Start,
                    seq: 0,
                    reason: RetransmitReason::Timeout,
                });
                endpoint.emit(TransferEvent::StartSent {
                    file_name: descriptor.file_name.clone(),
                    file_size: descriptor.file_size,
                    attempt,
                });
            }
        }
    }
}

/// Send one chunk and wait until it is acknowledged.
fn deliver_chunk<T: Transport>(
    endpoint: &mut Endpoint<T>,
    seq: u32,
    payload: Bytes,
) -> Result<(), TransferError> {
    let len = payload.len();
    // Encoded once; every retransmit is byte-for-byte identical.
    let packet = encode_packet(&Packet::Data(DataPacket::new(seq, payload)?));

    endpoint.send(&packet);
    endpoint.emit(TransferEvent::ChunkSent { seq, len });

    loop {
        match endpoint.recv() {
            Incoming::Packet(Packet::Ack { seq: acked }) if acked == seq => {
                endpoint.reset_budget();
                endpoint.stats.record_chunk(len);
                endpoint.emit(TransferEvent::ChunkAcked { seq });
                return Ok(());
            }
            Incoming::Packet(Packet::Nack { seq: rejected }) if rejected == seq => {
                // Peer rejected rather than went silent: resend without
                // charging the budget.
                endpoint.reset_budget();
                TransferStats::bump(&endpoint.stats.nacks);
                endpoint.emit(TransferEvent::NackReceived { seq });
                resend(endpoint, &packet, seq, RetransmitReason::Nack);
            }
            // Stale replies are not progress: no resend, budget untouched.
            Incoming::Packet(Packet::Ack { seq: other }) => {
                endpoint.emit(TransferEvent::StaleReply {
                    kind: PacketKind::Ack,
                    seq: other,
                    expected: seq,
                });
            }
            Incoming::Packet(Packet::Nack { seq: other }) => {
                endpoint.emit(TransferEvent::StaleReply {
                    kind: PacketKind::Nack,
                    seq: other,
                    expected: seq,
                });
            }
            Incoming::Packet(other) => {
                endpoint.discard(format!("unexpected {} while awaiting ack {}", other.kind(), seq));
            }
            Incoming::Malformed(e) => endpoint.discard(e.to_string()),
            Incoming::Silence => {
                endpoint.timeout(Phase::Chunk, seq)?;
                resend(endpoint, &packet, seq, RetransmitReason::Timeout);
            }
        }
    }
}

fn resend<T: Transport>(endpoint: &Endpoint<T>, packet: &Bytes, seq: u32, reason: RetransmitReason) {
    endpoint.send(packet);
    TransferStats::bump(&endpoint.stats.retransmits);
    endpoint.emit(TransferEvent::Retransmit {
        kind: PacketKind::Data,
        seq,
        reason,
    });
}

/// Read up to `chunk_size` bytes. Short only at end of input; empty at EOF.
fn read_chunk(input: &mut impl Read, chunk_size: usize) -> io::Result<Bytes> {
    let mut buf = Vec::with_capacity(chunk_size);
    input.by_ref().take(chunk_size as u64).read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Name announced in `Start`: the last path component.
fn advertised_name(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_chunk_splits_input() {
        let data: Vec<u8> = (0..2058u32).map(|i| i as u8).collect();
        let mut input = io::Cursor::new(data.clone());

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let chunk = read_chunk(&mut input, 1024).unwrap();
            (!chunk.is_empty()).then_some(chunk.len())
        })
        .collect();
        assert_eq!(sizes, vec![1024, 1024, 10]);
    }

    #[test]
    fn test_read_chunk_exact_multiple_ends_with_empty() {
        let mut input = io::Cursor::new(vec![1u8; 8]);
        assert_eq!(read_chunk(&mut input, 4).unwrap().len(), 4);
        assert_eq!(read_chunk(&mut input, 4).unwrap().len(), 4);
        assert!(read_chunk(&mut input, 4).unwrap().is_empty());
    }

    #[test]
    fn test_advertised_name() {
        assert_eq!(advertised_name(Path::new("/tmp/dir/photo.jpg")).unwrap(), "photo.jpg");
        assert_eq!(advertised_name(Path::new("notes.txt")).unwrap(), "notes.txt");
        assert!(matches!(
            advertised_name(Path::new("/")),
            Err(TransferError::InvalidFileName(_))
        ));
    }
}
