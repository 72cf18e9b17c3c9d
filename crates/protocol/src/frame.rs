//! Frame encoding and decoding.
//!
//! # Wire format
//!
//! ```text
//! +-----+--------+--------+-------------------+----------+
//! | len | cmd_hi | cmd_lo | payload[0..len-3] | checksum |
//! +-----+--------+--------+-------------------+----------+
//! ```
//!
//! `len` is the payload length plus 3 (two opcode bytes and the checksum).
//! A frame occupies `len + 1` bytes on the wire. The checksum is the XOR
//! of every preceding byte, `len` included.

use crate::constants::{FRAME_OVERHEAD, MAX_PAYLOAD};

/// Errors from the frame codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("invalid length byte {0}")]
    InvalidLength(u8),

    #[error("truncated frame: declared {declared} bytes, have {available}")]
    Truncated { declared: usize, available: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: u16, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// Serialises the frame to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode(self.code, &self.payload)
    }

    /// Total size of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }
}

/// XOR of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Encodes an opcode and payload into a complete frame.
pub fn encode(code: u16, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut buf = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.push((payload.len() + 3) as u8);
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Decodes a buffer holding exactly one frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    match decode_prefix(bytes)? {
        Some((frame, used)) if used == bytes.len() => Ok(frame),
        Some((_, used)) => Err(FrameError::TrailingBytes(bytes.len() - used)),
        None => {
            if bytes.len() < FRAME_OVERHEAD {
                Err(FrameError::TooShort(bytes.len()))
            } else {
                Err(FrameError::Truncated {
                    declared: bytes[0] as usize + 1,
                    available: bytes.len(),
                })
            }
        }
    }
}

/// Decodes the frame at the start of `bytes`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
/// the number of bytes it occupied.
pub fn decode_prefix(bytes: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(&len) = bytes.first() else {
        return Ok(None);
    };
    if len < 3 || len as usize > MAX_PAYLOAD + 3 {
        return Err(FrameError::InvalidLength(len));
    }

    let total = len as usize + 1;
    if bytes.len() < total {
        return Ok(None);
    }

    let expected = checksum(&bytes[..total - 1]);
    let actual = bytes[total - 1];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let code = u16::from_be_bytes([bytes[1], bytes[2]]);
    let payload = bytes[3..total - 1].to_vec();
    Ok(Some((Frame { code, payload }, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let bytes = encode(0x020A, &[0x03, 0x01, 0x00]).unwrap();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..3], &[0x02, 0x0A]);
        assert_eq!(&bytes[3..6], &[0x03, 0x01, 0x00]);
        assert_eq!(bytes[6], 6 ^ 0x02 ^ 0x0A ^ 0x03 ^ 0x01);
    }

    #[test]
    fn frame_spans_len_plus_one_bytes() {
        let bytes = encode(0x000D, &[2, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(bytes[0], 9);
        assert_eq!(bytes.len(), 10);

        let (frame, used) = decode_prefix(&bytes).unwrap().unwrap();
        assert_eq!(used, 10);
        assert_eq!(frame, Frame::new(0x000D, vec![2, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn empty_payload_round_trip() {
        let bytes = encode(0x000C, &[]).unwrap();
        assert_eq!(bytes, vec![3, 0x00, 0x0C, 3 ^ 0x0C]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame, Frame::new(0x000C, vec![]));
    }

    #[test]
    fn round_trip_across_sizes() {
        for len in [0usize, 1, 3, 32, 65, 66, 124, MAX_PAYLOAD] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 1) as u8).collect();
            for code in [0x0000u16, 0x0300, 0x3001, 0xFFFF] {
                let bytes = encode(code, &payload).unwrap();
                let frame = decode(&bytes).unwrap();
                assert_eq!(frame.code, code);
                assert_eq!(frame.payload, payload);
                assert_eq!(frame.wire_len(), bytes.len());
            }
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let err = encode(0x0300, &[0; MAX_PAYLOAD + 1]).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooLarge {
                len: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            }
        );
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let bytes = encode(0x0320, &[0x00, 0x01, 0x01, 0x03, 0x02, 0x10, 0x01, 0x05]).unwrap();
        for i in 0..bytes.len() {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[i] ^= 1 << bit;
                assert!(
                    decode(&corrupted).is_err(),
                    "flip of bit {bit} in byte {i} not detected"
                );
            }
        }
    }

    #[test]
    fn short_buffer() {
        assert_eq!(decode(&[]), Err(FrameError::TooShort(0)));
        assert_eq!(decode(&[3, 0]), Err(FrameError::TooShort(2)));
    }

    #[test]
    fn truncated_buffer() {
        let bytes = encode(0x0300, &[1, 2, 3, 4]).unwrap();
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            FrameError::Truncated {
                declared: 8,
                available: 7
            }
        );
    }

    #[test]
    fn trailing_bytes() {
        let mut bytes = encode(0x000C, &[]).unwrap();
        bytes.push(0xAA);
        assert_eq!(decode(&bytes), Err(FrameError::TrailingBytes(1)));
    }

    #[test]
    fn invalid_length_byte() {
        assert_eq!(decode(&[2, 0, 0, 2]), Err(FrameError::InvalidLength(2)));
        assert_eq!(
            decode_prefix(&[0xFF, 0, 0]),
            Err(FrameError::InvalidLength(0xFF))
        );
    }

    #[test]
    fn decode_prefix_streams_back_to_back_frames() {
        let mut buf = encode(0x000D, &[2, 0, 0, 0, 0, 0]).unwrap();
        buf.extend(encode(0x0304, &[0x00, 0x07]).unwrap());

        let (first, used) = decode_prefix(&buf).unwrap().unwrap();
        assert_eq!(first.code, 0x000D);
        let (second, used2) = decode_prefix(&buf[used..]).unwrap().unwrap();
        assert_eq!(second.code, 0x0304);
        assert_eq!(second.payload, vec![0x00, 0x07]);
        assert_eq!(used + used2, buf.len());
    }

    #[test]
    fn decode_prefix_needs_more() {
        let bytes = encode(0x0300, &[9; 10]).unwrap();
        assert_eq!(decode_prefix(&bytes[..5]), Ok(None));
        assert_eq!(decode_prefix(&[]), Ok(None));
    }
}
