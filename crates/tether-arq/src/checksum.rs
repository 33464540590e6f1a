/// Per-chunk integrity check: CRC-32/ISO-HDLC (the common "CRC-32").
///
/// Reflected polynomial 0xEDB88320, init 0xFFFFFFFF, final XOR 0xFFFFFFFF.
/// The lookup table lives in a single immutable static shared by every caller.

use crc::{CRC_32_ISO_HDLC, Crc};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 over exactly `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(checksum(&data), checksum(&data.clone()));
    }

    #[test]
    fn test_every_single_bit_flip_detected() {
        let data = b"stop-and-wait chunk payload".to_vec();
        let original = checksum(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(checksum(&flipped), original, "flip at {byte}:{bit}");
            }
        }
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }
}
