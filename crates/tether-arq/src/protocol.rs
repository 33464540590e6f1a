/// Wire format for the stop-and-wait transfer protocol.
///
/// Every packet starts with a single type tag byte. All integers are big-endian.
///
/// ```text
/// Start (tag 0), 325 bytes:
///   [0]        tag
///   [1..5]     file size (u32 BE)
///   [5..69]    SHA-256 of the whole file, 64 lowercase hex chars
///   [69..325]  file name, UTF-8, NUL padded (at most 255 bytes used)
///
/// Ack (tag 1) / Nack (tag 2) / Stop (tag 4), 5 bytes:
///   [0]        tag
///   [1..5]     sequence number (u32 BE)
///
/// Data (tag 3), 11 + payload bytes:
///   [0]        tag
///   [1..5]     sequence number (u32 BE)
///   [5..7]     payload length (u16 BE, <= MAX_PAYLOAD_SIZE)
///   [7..11]    CRC-32 of the payload (u32 BE)
///   [11..]     payload
/// ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::checksum::checksum;

/// Largest payload a single `Data` packet may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Length of the hex digest field in `Start`.
pub const DIGEST_FIELD: usize = 64;

/// Capacity of the file name field in `Start`, including the terminating NUL.
pub const FILE_NAME_FIELD: usize = 256;

/// `Start` packet size.
pub const START_LEN: usize = 1 + 4 + DIGEST_FIELD + FILE_NAME_FIELD;

/// `Ack`, `Nack` and `Stop` packet size.
pub const CONTROL_LEN: usize = 1 + 4;

/// `Data` header size (everything before the payload).
pub const DATA_HEADER: usize = 1 + 4 + 2 + 4;

/// Largest datagram the protocol ever produces.
pub const MAX_DATAGRAM: usize = DATA_HEADER + MAX_PAYLOAD_SIZE;

/// Receive buffer size. Slightly larger than any valid datagram so oversized
/// packets show up as a length mismatch instead of being silently clipped.
pub const RECV_BUFFER: usize = MAX_DATAGRAM + 64;

/// Packet type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Start = 0,
    Ack = 1,
    Nack = 2,
    Data = 3,
    Stop = 4,
}

impl PacketKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Start),
            1 => Some(Self::Ack),
            2 => Some(Self::Nack),
            3 => Some(Self::Data),
            4 => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Data => "DATA",
            Self::Stop => "STOP",
        };
        f.write_str(name)
    }
}

/// File metadata announced by the sender during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartDescriptor {
    pub file_size: u32,
    /// Lowercase hex SHA-256 of the whole file.
    pub sha256: String,
    pub file_name: String,
}

/// One chunk of file payload. The payload never exceeds `MAX_PAYLOAD_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub(crate) seq: u32,
    /// CRC-32 carried on the wire. Not necessarily the checksum of `payload`
    /// for a packet that was corrupted in transit.
    pub(crate) checksum: u32,
    pub(crate) payload: Bytes,
}

impl DataPacket {
    /// Build a chunk and compute its checksum.
    pub fn new(seq: u32, payload: Bytes) -> Result<Self, EncodeError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let checksum = checksum(&payload);
        Ok(Self {
            seq,
            checksum,
            payload,
        })
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the carried checksum matches the payload.
    pub fn verify(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }
}

/// A decoded protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start(StartDescriptor),
    Ack { seq: u32 },
    Nack { seq: u32 },
    Data(DataPacket),
    Stop { seq: u32 },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Start(_) => PacketKind::Start,
            Self::Ack { .. } => PacketKind::Ack,
            Self::Nack { .. } => PacketKind::Nack,
            Self::Data(_) => PacketKind::Data,
            Self::Stop { .. } => PacketKind::Stop,
        }
    }

    /// Exact number of bytes `encode_packet` produces for this packet.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Start(_) => START_LEN,
            Self::Ack { .. } | Self::Nack { .. } | Self::Stop { .. } => CONTROL_LEN,
            Self::Data(data) => DATA_HEADER + data.payload.len(),
        }
    }
}

/// Reasons a datagram could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet too short: {len} bytes, need {need}")]
    TooShort { len: usize, need: usize },
    #[error("unknown packet type tag {0}")]
    UnknownType(u8),
    #[error("{kind} length mismatch: declared {declared}, received {actual}")]
    LengthMismatch {
        kind: PacketKind,
        declared: usize,
        actual: usize,
    },
}

/// Rejected packet contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Encode a packet into its wire representation. Infallible: every
/// `DataPacket` was size-checked when it was built.
pub fn encode_packet(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::with_capacity(packet.encoded_len());
    buf.put_u8(packet.kind().tag());

    match packet {
        Packet::Start(start) => {
            buf.put_u32(start.file_size);
            put_fixed(&mut buf, truncate_utf8(&start.sha256, DIGEST_FIELD), DIGEST_FIELD);
            put_fixed(
                &mut buf,
                truncate_utf8(&start.file_name, FILE_NAME_FIELD - 1),
                FILE_NAME_FIELD,
            );
        }
        Packet::Ack { seq } | Packet::Nack { seq } | Packet::Stop { seq } => {
            buf.put_u32(*seq);
        }
        Packet::Data(data) => {
            buf.put_u32(data.seq);
            buf.put_u16(data.payload.len() as u16);
            buf.put_u32(data.checksum);
            buf.put_slice(&data.payload);
        }
    }

    debug_assert_eq!(buf.len(), packet.encoded_len());
    buf.freeze()
}

/// Decode a datagram. Never panics; malformed input yields a `DecodeError`.
pub fn decode_packet(data: &[u8]) -> Result<Packet, DecodeError> {
    let Some(&tag) = data.first() else {
        return Err(DecodeError::TooShort { len: 0, need: 1 });
    };
    let kind = PacketKind::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;

    let need = match kind {
        PacketKind::Start => START_LEN,
        PacketKind::Data => DATA_HEADER,
        PacketKind::Ack | PacketKind::Nack | PacketKind::Stop => CONTROL_LEN,
    };
    if data.len() < need {
        return Err(DecodeError::TooShort {
            len: data.len(),
            need,
        });
    }
    if kind != PacketKind::Data && data.len() != need {
        return Err(DecodeError::LengthMismatch {
            kind,
            declared: need,
            actual: data.len(),
        });
    }

    let mut buf = &data[1..];
    let packet = match kind {
        PacketKind::Start => {
            let file_size = buf.get_u32();
            let sha256 = read_fixed(&buf[..DIGEST_FIELD]);
            buf.advance(DIGEST_FIELD);
            let file_name = read_fixed(&buf[..FILE_NAME_FIELD]);
            Packet::Start(StartDescriptor {
                file_size,
                sha256,
                file_name,
            })
        }
        PacketKind::Ack => Packet::Ack { seq: buf.get_u32() },
        PacketKind::Nack => Packet::Nack { seq: buf.get_u32() },
        PacketKind::Stop => Packet::Stop { seq: buf.get_u32() },
        PacketKind::Data => {
            let seq = buf.get_u32();
            let declared = buf.get_u16() as usize;
            let checksum = buf.get_u32();
            if declared > MAX_PAYLOAD_SIZE || declared != buf.remaining() {
                return Err(DecodeError::LengthMismatch {
                    kind,
                    declared,
                    actual: buf.remaining(),
                });
            }
            Packet::Data(DataPacket {
                seq,
                checksum,
                payload: Bytes::copy_from_slice(buf),
            })
        }
    };
    Ok(packet)
}

/// Write `value` and pad with NULs to exactly `width` bytes.
fn put_fixed(buf: &mut BytesMut, value: &str, width: usize) {
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, width - value.len());
}

/// Read a NUL-terminated (or field-filling) string.
fn read_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a char.
fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
