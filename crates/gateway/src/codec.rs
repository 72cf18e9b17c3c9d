//! Stream framing for the gateway socket.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use klf200_protocol::Frame;
use klf200_protocol::constants::FRAME_OVERHEAD;
use klf200_protocol::frame;

use crate::error::GatewayError;
use crate::types::ResyncPolicy;

/// Splits the byte stream into [`Frame`]s and serialises outbound ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayCodec {
    resync: ResyncPolicy,
}

impl GatewayCodec {
    pub fn new(resync: ResyncPolicy) -> Self {
        Self { resync }
    }
}

impl Decoder for GatewayCodec {
    type Item = Frame;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, GatewayError> {
        loop {
            match frame::decode_prefix(&src[..]) {
                Ok(Some((frame, used))) => {
                    trace!(
                        code = %format_args!("{:#06x}", frame.code),
                        bytes = ?&src[..used],
                        "frame decoded"
                    );
                    src.advance(used);
                    return Ok(Some(frame));
                }
                Ok(None) => {
                    if let Some(&len) = src.first() {
                        src.reserve((len as usize + 1).saturating_sub(src.len()));
                    } else {
                        src.reserve(FRAME_OVERHEAD);
                    }
                    return Ok(None);
                }
                Err(e) => match self.resync {
                    ResyncPolicy::DropByte => {
                        warn!(error = %e, "framing error, dropping one byte to resynchronise");
                        src.advance(1);
                    }
                    ResyncPolicy::Reconnect => return Err(e.into()),
                },
            }
        }
    }
}

impl Encoder<Frame> for GatewayCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), GatewayError> {
        let bytes = item.encode()?;
        trace!(code = %format_args!("{:#06x}", item.code), bytes = ?bytes, "frame encoded");
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(code: u16, payload: &[u8]) -> Vec<u8> {
        frame::encode(code, payload).unwrap()
    }

    #[test]
    fn decodes_complete_frame_in_one_read() {
        let mut codec = GatewayCodec::default();
        let mut buf = BytesMut::from(&[0x09, 0x00, 0x0D, 0x02, 0, 0, 0, 0, 0, 0x06][..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.code, 0x000D);
        assert_eq!(frame.payload, vec![2, 0, 0, 0, 0, 0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_frames_split_across_reads() {
        let mut codec = GatewayCodec::default();
        let bytes = wire(0x000D, &[2, 0, 0, 0, 0, 0]);
        let mut buf = BytesMut::from(&bytes[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[4..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.code, 0x000D);
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = GatewayCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire(0x0211, &[1, 5, 0, 0]));
        buf.extend_from_slice(&wire(0x0304, &[0, 9]));
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().code, 0x0211);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().code, 0x0304);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn drop_byte_skips_garbage() {
        let mut codec = GatewayCodec::new(ResyncPolicy::DropByte);
        let mut buf = BytesMut::from(&[0x00, 0x01][..]);
        buf.extend_from_slice(&wire(0x0009, &[0; 9]));
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.code, 0x0009);
    }

    #[test]
    fn drop_byte_recovers_from_bad_checksum() {
        let mut codec = GatewayCodec::new(ResyncPolicy::DropByte);
        let mut bad = wire(0x0009, &[0; 9]);
        bad[3] ^= 0x01;
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&wire(0x000B, &[0, 3, 0, 18]));

        let mut codes = vec![];
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            codes.push(frame.code);
        }
        assert_eq!(codes, vec![0x000B]);
    }

    #[test]
    fn reconnect_policy_reports_error() {
        let mut codec = GatewayCodec::new(ResyncPolicy::Reconnect);
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(GatewayError::Frame(klf200_protocol::FrameError::InvalidLength(1)))
        ));
    }

    #[test]
    fn encodes_frame() {
        let mut codec = GatewayCodec::default();
        let mut dst = BytesMut::new();
        codec
            .encode(Frame::new(0x020A, vec![3, 1, 0]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &wire(0x020A, &[3, 1, 0])[..]);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut codec = GatewayCodec::default();
        let mut dst = BytesMut::new();
        let err = codec.encode(Frame::new(0x0300, vec![0; 300]), &mut dst);
        assert!(matches!(err, Err(GatewayError::Frame(_))));
        assert!(dst.is_empty());
    }
}
