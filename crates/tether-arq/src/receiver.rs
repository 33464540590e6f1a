/// Stop-and-wait receiver.
///
/// ```text
/// AwaitingStart ──Start──> Receiving(expected) ──Stop──> verify digest ──> Done
///                  Ack(0)     │
///                             ├─ Data(expected), CRC ok  -> write, Ack(expected), expected += 1
///                             ├─ Data(expected), CRC bad -> Nack(expected)
///                             ├─ Data(other)             -> Ack(other), nothing written
///                             └─ Start again             -> Ack(0), file left as is
/// ```
///
/// Chunks land on disk strictly in sequence order, each exactly once.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ArqConfig;
use crate::digest::file_sha256;
use crate::error::{Phase, TransferError};
use crate::logging::{TransferEvent, TransferLogger};
use crate::protocol::{DataPacket, Packet, StartDescriptor};
use crate::session::{Endpoint, Incoming};
use crate::stats::TransferStats;
use crate::transport::Transport;

/// Name used when the announced one has no usable final component.
const FALLBACK_FILE_NAME: &str = "unknown_file";

/// Configuration for the receiver.
pub struct ReceiverConfig {
    pub peer_addr: SocketAddr,
    pub output_dir: PathBuf,
    pub arq: ArqConfig,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

/// Outcome of a transfer that reached `Stop`. A digest mismatch is reported
/// here, not as an error: the bytes are on disk either way.
#[derive(Debug, Clone)]
pub struct ReceiveResult {
    pub file_name: String,
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub chunks: u32,
    pub expected_sha256: String,
    pub actual_sha256: String,
    pub digest_match: bool,
    /// Bytes written equal the size announced in `Start`.
    pub size_match: bool,
    /// `Stop` carried the number of chunks actually accepted.
    pub sequence_match: bool,
    pub elapsed: Duration,
}

/// Output file plus the in-order write cursor.
struct ChunkSink {
    writer: BufWriter<File>,
    expected_seq: u32,
    bytes_written: u64,
}

impl ChunkSink {
    fn accept(&mut self, data: &DataPacket) -> io::Result<()> {
        self.writer.write_all(&data.payload)?;
        self.expected_seq += 1;
        self.bytes_written += data.payload.len() as u64;
        Ok(())
    }

    /// Flush and close the output file.
    fn finish(self) -> io::Result<(u32, u64)> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok((self.expected_seq, self.bytes_written))
    }
}

/// Accept one file from the peer. Blocks until `Stop` arrives or the retry
/// budget runs out.
pub fn run_receiver<T: Transport>(
    config: ReceiverConfig,
    transport: T,
    stats: Arc<TransferStats>,
) -> Result<ReceiveResult, TransferError> {
    config.arq.validate()?;
    let chunk_size = config.arq.chunk_size;

    let mut endpoint = Endpoint::new(
        "receiver",
        transport,
        config.peer_addr,
        config.logger,
        stats.clone(),
        config.arq.max_retries,
    );

    let (descriptor, file_name, output_path, file) = await_start(&mut endpoint, &config.output_dir)?;
    let start = Instant::now();
    stats.set_total(descriptor.file_size as u64, chunk_size);

    let mut sink = ChunkSink {
        writer: BufWriter::new(file),
        expected_seq: 0,
        bytes_written: 0,
    };
    let stop_seq = receive_chunks(&mut endpoint, &mut sink, chunk_size)?;
    let (chunks, bytes_written) = sink.finish()?;

    let actual_sha256 = file_sha256(&output_path)?;
    let digest_match = actual_sha256 == descriptor.sha256;
    endpoint.emit(TransferEvent::DigestVerified {
        expected: descriptor.sha256.clone(),
        actual: actual_sha256.clone(),
        matched: digest_match,
    });

    let size_match = bytes_written == descriptor.file_size as u64;
    if !size_match {
        tracing::warn!(
            announced = descriptor.file_size,
            written = bytes_written,
            "received size differs from announced size"
        );
    }
    let sequence_match = stop_seq == chunks;
    if !sequence_match {
        tracing::warn!(stop_seq, chunks, "STOP sequence differs from chunks received");
    }

    let elapsed = start.elapsed();
    endpoint.emit(TransferEvent::TransferComplete {
        total_bytes: bytes_written,
        chunks,
        // duplicates are what the receiver sees of sender retransmits
        retransmits: stats.snapshot().duplicates,
        duration_ms: elapsed.as_millis() as u64,
    });

    Ok(ReceiveResult {
        file_name,
        output_path,
        bytes_written,
        chunks,
        expected_sha256: descriptor.sha256,
        actual_sha256,
        digest_match,
        size_match,
        sequence_match,
        elapsed,
    })
}

/// Wait for `Start`, open the output file and acknowledge with `Ack(0)`.
fn await_start<T: Transport>(
    endpoint: &mut Endpoint<T>,
    output_dir: &Path,
) -> Result<(StartDescriptor, String, PathBuf, File), TransferError> {
    loop {
        match endpoint.recv() {
            Incoming::Packet(Packet::Start(descriptor)) => {
                endpoint.reset_budget();

                let file_name = sanitize_file_name(&descriptor.file_name);
                fs::create_dir_all(output_dir).map_err(|source| TransferError::File {
                    path: output_dir.to_path_buf(),
                    source,
                })?;
                let path = output_dir.join(&file_name);
                let file = File::create(&path).map_err(|source| TransferError::File {
                    path: path.clone(),
                    source,
                })?;

                endpoint.send_packet(&Packet::Ack { seq: 0 });
                endpoint.emit(TransferEvent::StartReceived {
                    file_name: descriptor.file_name.clone(),
                    file_size: descriptor.file_size,
                    path: path.display().to_string(),
                });
                return Ok((descriptor, file_name, path, file));
            }
            Incoming::Packet(other) => {
                endpoint.discard(format!("{} before START", other.kind()));
            }
            Incoming::Malformed(e) => endpoint.discard(e.to_string()),
            Incoming::Silence => endpoint.timeout(Phase::AwaitingStart, 0)?,
        }
    }
}

/// Accept chunks until `Stop`. Returns the sequence carried by `Stop`.
fn receive_chunks<T: Transport>(
    endpoint: &mut Endpoint<T>,
    sink: &mut ChunkSink,
    chunk_size: usize,
) -> Result<u32, TransferError> {
    loop {
        match endpoint.recv() {
            Incoming::Packet(Packet::Data(data)) => {
                // Oversized chunks are not progress: budget untouched.
                if data.payload.len() > chunk_size {
                    endpoint.discard(format!(
                        "DATA seq {} carries {} bytes, limit {}",
                        data.seq,
                        data.payload.len(),
                        chunk_size
                    ));
                    continue;
                }
                endpoint.reset_budget();
                on_data(endpoint, sink, &data)?;
            }
            Incoming::Packet(Packet::Stop { seq }) => {
                endpoint.reset_budget();
                endpoint.emit(TransferEvent::StopReceived {
                    seq,
                    expected: sink.expected_seq,
                });
                return Ok(seq);
            }
            // Our Ack(0) was lost; the file is already open.
            Incoming::Packet(Packet::Start(_)) => {
                endpoint.reset_budget();
                endpoint.send_packet(&Packet::Ack { seq: 0 });
                endpoint.emit(TransferEvent::StartRepeated);
            }
            Incoming::Packet(other) => {
                endpoint.discard(format!("unexpected {} while receiving", other.kind()));
            }
            Incoming::Malformed(e) => endpoint.discard(e.to_string()),
            Incoming::Silence => endpoint.timeout(Phase::Receiving, sink.expected_seq)?,
        }
    }
}

fn on_data<T: Transport>(
    endpoint: &mut Endpoint<T>,
    sink: &mut ChunkSink,
    data: &DataPacket,
) -> Result<(), TransferError> {
    let expected = sink.expected_seq;

    if data.seq != expected {
        // Already written (our ACK was lost) or not yet due. Acknowledge the
        // packet's own sequence and write nothing.
        endpoint.send_packet(&Packet::Ack { seq: data.seq });
        TransferStats::bump(&endpoint.stats.duplicates);
        endpoint.emit(TransferEvent::DuplicateChunk {
            seq: data.seq,
            expected,
        });
        return Ok(());
    }

    if !data.verify() {
        endpoint.send_packet(&Packet::Nack { seq: expected });
        TransferStats::bump(&endpoint.stats.nacks);
        endpoint.emit(TransferEvent::ChecksumMismatch {
            seq: expected,
            expected: data.checksum,
            actual: crate::checksum::checksum(&data.payload),
        });
        return Ok(());
    }

    // A failed write is fatal; the half-written file stays on disk.
    sink.accept(data)?;
    endpoint.send_packet(&Packet::Ack { seq: expected });
    endpoint.stats.record_chunk(data.payload.len());
    endpoint.emit(TransferEvent::ChunkWritten {
        seq: expected,
        len: data.payload.len(),
    });
    Ok(())
}

/// Reduce an announced name to its final component so the output always
/// lands directly inside the output directory.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");
    match base.trim_matches('\0') {
        "" | "." | ".." => FALLBACK_FILE_NAME.to_string(),
        other => other.to_string(),
    }
}
