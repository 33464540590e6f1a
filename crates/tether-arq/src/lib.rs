/// Tether ARQ: reliable single-file transfer over UDP.
///
/// Stop-and-wait with one packet in flight:
/// - `Start` handshake announcing size, SHA-256 and name
/// - CRC-32 per chunk, `Nack` on corruption, `Ack` on success
/// - Timeout-driven retransmission with a per-phase retry budget
/// - Whole-file SHA-256 verification on the receiving side

pub mod checksum;
pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod sender;
mod session;
pub mod stats;
pub mod transport;

// Re-export key types for convenience.
pub use config::{ArqConfig, DEFAULT_MAX_RETRIES, DEFAULT_OUTPUT_DIR, DEFAULT_RECV_TIMEOUT};
pub use error::{ConfigError, Phase, TransferError};
pub use logging::{NullLogger, RetransmitReason, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use protocol::{
    decode_packet, encode_packet, DataPacket, DecodeError, EncodeError, Packet, PacketKind, StartDescriptor,
    MAX_PAYLOAD_SIZE,
};
pub use receiver::{run_receiver, ReceiveResult, ReceiverConfig};
pub use sender::{run_sender, SendResult, SenderConfig};
pub use stats::{StatsSnapshot, TransferStats};
pub use transport::{RecvOutcome, Transport, UdpTransport};
