//! Tokio codec that turns a byte stream into [`Frame`]s
//!
//! The decoder walks the four header/payload stages in order and only ever
//! consumes exactly `24 + length` bytes per frame, so a checksum mismatch on
//! one frame does not disturb the framing of the next.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::config::{ReceiverConfig, SignaturePolicy};
use crate::frame::{find_signature, read_checksum, read_length, read_signature, SIGNATURE_BYTES};
use crate::types::{
    Checksum, Frame, FrameHeader, FrameStage, XferError, CHECKSUM_LEN, LENGTH_LEN, SIGNATURE_LEN,
};

/// Largest single reservation made for a payload that has not arrived yet
const PAYLOAD_RESERVE_CHUNK: usize = 64 * 1024;

/// Where the decoder is inside the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitSignature,
    AwaitLength,
    AwaitChecksum { length: u32 },
    AwaitPayload { length: u32, checksum: Checksum },
}

impl DecodeState {
    pub fn stage(&self) -> FrameStage {
        match self {
            DecodeState::AwaitSignature => FrameStage::Signature,
            DecodeState::AwaitLength => FrameStage::Length,
            DecodeState::AwaitChecksum { .. } => FrameStage::Checksum,
            DecodeState::AwaitPayload { .. } => FrameStage::Payload,
        }
    }
}

/// Frame decoder holding the framing state of a single connection
#[derive(Debug)]
pub struct XferFrameCodec {
    state: DecodeState,
    policy: SignaturePolicy,
    max_payload_len: u32,
    discarded: u64,
    pending_discard: u64,
}

impl Default for XferFrameCodec {
    fn default() -> Self {
        Self::new(&ReceiverConfig::default())
    }
}

impl XferFrameCodec {
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            state: DecodeState::AwaitSignature,
            policy: config.signature_policy,
            max_payload_len: config.max_payload_len,
            discarded: 0,
            pending_discard: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes skipped while resynchronizing, over the codec's lifetime
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self, src: &mut BytesMut, count: usize) {
        src.advance(count);
        self.discarded += count as u64;
        self.pending_discard += count as u64;
    }

    fn log_pending_discard(&mut self, context: &str) {
        if self.pending_discard > 0 {
            warn!("Discarded {} bytes {}", self.pending_discard, context);
            self.pending_discard = 0;
        }
    }

    /// Consume the signature, or apply the mismatch policy.
    /// Returns `false` when more input is needed.
    fn take_signature(&mut self, src: &mut BytesMut) -> Result<bool, XferError> {
        if src.len() < SIGNATURE_LEN {
            return Ok(false);
        }

        if src[..SIGNATURE_LEN] != SIGNATURE_BYTES {
            match self.policy {
                SignaturePolicy::Reject => {
                    return Err(XferError::InvalidSignature {
                        got: read_signature(src),
                    });
                }
                SignaturePolicy::Resync => match find_signature(src) {
                    Some(offset) => self.discard(src, offset),
                    None => {
                        // a signature may straddle this read and the next one
                        let keep = SIGNATURE_LEN - 1;
                        let count = src.len() - keep;
                        self.discard(src, count);
                        return Ok(false);
                    }
                },
            }
        }

        self.log_pending_discard("before the next signature");

        src.advance(SIGNATURE_LEN);
        self.state = DecodeState::AwaitLength;
        Ok(true)
    }
}

impl Decoder for XferFrameCodec {
    type Item = Frame;
    type Error = XferError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, XferError> {
        loop {
            match self.state {
                DecodeState::AwaitSignature => {
                    if !self.take_signature(src)? {
                        return Ok(None);
                    }
                }
                DecodeState::AwaitLength => {
                    if src.len() < LENGTH_LEN {
                        return Ok(None);
                    }
                    let length = read_length(src);
                    src.advance(LENGTH_LEN);

                    if length > self.max_payload_len {
                        return Err(XferError::PayloadTooLarge {
                            len: length as u64,
                            max: self.max_payload_len as u64,
                        });
                    }
                    self.state = DecodeState::AwaitChecksum { length };
                }
                DecodeState::AwaitChecksum { length } => {
                    if src.len() < CHECKSUM_LEN {
                        return Ok(None);
                    }
                    let checksum = read_checksum(src);
                    src.advance(CHECKSUM_LEN);
                    self.state = DecodeState::AwaitPayload { length, checksum };
                }
                DecodeState::AwaitPayload { length, checksum } => {
                    let needed = length as usize;
                    if src.len() < needed {
                        // grow with the data actually received, not the declared length
                        src.reserve((needed - src.len()).min(PAYLOAD_RESERVE_CHUNK));
                        return Ok(None);
                    }
                    let payload = src.split_to(needed).freeze();
                    self.state = DecodeState::AwaitSignature;
                    debug!("Decoded frame with {} byte payload", length);
                    return Ok(Some(Frame {
                        header: FrameHeader::new(length, checksum),
                        payload,
                    }));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, XferError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.log_pending_discard("without finding a signature");

        match self.state {
            DecodeState::AwaitSignature if src.is_empty() => Ok(None),
            // peer left before sending any of the announced payload
            DecodeState::AwaitPayload { .. } if src.is_empty() => Ok(None),
            state => Err(XferError::Truncated {
                stage: state.stage(),
                buffered: src.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_frame, encode_header};
    use crate::types::HEADER_LEN;

    fn wire(payload: &[u8]) -> BytesMut {
        let frame = Frame::new(payload.to_vec()).unwrap();
        BytesMut::from(&encode_frame(&frame)[..])
    }

    #[test]
    fn decodes_a_complete_frame() {
        let mut codec = XferFrameCodec::default();
        let mut buf = wire(b"hello");

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.header.length, 5);
        assert_eq!(&frame.payload[..], b"hello");
        assert!(frame.verify().is_match());
        assert!(buf.is_empty());
        assert_eq!(codec.state(), DecodeState::AwaitSignature);
    }

    #[test]
    fn walks_through_each_stage_on_partial_input() {
        let mut codec = XferFrameCodec::default();
        let full = wire(b"hello");
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&full[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.state(), DecodeState::AwaitSignature);

        buf.extend_from_slice(&full[3..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.state(), DecodeState::AwaitLength);

        buf.extend_from_slice(&full[6..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.state(), DecodeState::AwaitChecksum { length: 5 });

        buf.extend_from_slice(&full[20..26]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.state().stage(), FrameStage::Payload);

        buf.extend_from_slice(&full[26..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[test]
    fn back_to_back_frames_stay_aligned() {
        let mut codec = XferFrameCodec::default();
        let mut buf = wire(b"first");
        buf.extend_from_slice(&wire(b"")[..]);
        buf.extend_from_slice(&wire(b"third frame")[..]);

        let payloads: Vec<_> = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .map(|frame| frame.payload)
            .collect();
        assert_eq!(payloads.len(), 3);
        assert_eq!(&payloads[0][..], b"first");
        assert!(payloads[1].is_empty());
        assert_eq!(&payloads[2][..], b"third frame");
    }

    #[test]
    fn mismatched_checksum_still_consumes_the_declared_length() {
        let mut codec = XferFrameCodec::default();
        let mut buf = wire(b"hello");
        let last = buf.len() - 1;
        buf[last] = b'p';
        buf.extend_from_slice(&wire(b"next")[..]);

        let tampered = codec.decode(&mut buf).unwrap().unwrap();
        assert!(!tampered.verify().is_match());

        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&next.payload[..], b"next");
        assert!(next.verify().is_match());
    }

    #[test]
    fn bad_signature_is_rejected_without_reading_a_length() {
        let mut codec = XferFrameCodec::default();
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x00, 0x00, 0x00][..]);

        match codec.decode(&mut buf) {
            Err(XferError::InvalidSignature { got }) => assert_eq!(got, 0x0403_0201),
            other => panic!("expected invalid signature, got {:?}", other),
        }
        assert_eq!(codec.state(), DecodeState::AwaitSignature);
    }

    #[test]
    fn resync_skips_garbage_up_to_the_next_signature() {
        let config = ReceiverConfig::new().with_signature_policy(SignaturePolicy::Resync);
        let mut codec = XferFrameCodec::new(&config);
        let mut buf = BytesMut::from(&[0x00, 0xFD, 0xFD, 0x11, 0x22][..]);
        buf.extend_from_slice(&wire(b"hello")[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"hello");
        assert_eq!(codec.discarded(), 5);
    }

    #[test]
    fn resync_keeps_a_possible_partial_signature() {
        let config = ReceiverConfig::new().with_signature_policy(SignaturePolicy::Resync);
        let mut codec = XferFrameCodec::new(&config);
        let full = wire(b"hi");
        let mut buf = BytesMut::from(&[0x42, 0x42, 0x42][..]);
        buf.extend_from_slice(&full[..2]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.discarded(), 2);
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&full[2..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"hi");
        assert_eq!(codec.discarded(), 3);
    }

    #[test]
    fn huge_declared_length_reserves_only_a_chunk() {
        let header = encode_header(&FrameHeader::new(u32::MAX, Checksum::default()));
        let mut codec = XferFrameCodec::default();
        let mut buf = BytesMut::from(&header[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.state().stage(), FrameStage::Payload);
        assert!(buf.capacity() <= PAYLOAD_RESERVE_CHUNK + HEADER_LEN);

        buf.extend_from_slice(&[0u8; 100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.capacity() < 1024 * 1024);
    }

    #[test]
    fn resync_reports_skipped_bytes_when_stream_ends_without_signature() {
        let config = ReceiverConfig::new().with_signature_policy(SignaturePolicy::Resync);
        let mut codec = XferFrameCodec::new(&config);
        let mut buf = BytesMut::from(&b"nothing but noise"[..]);

        match codec.decode_eof(&mut buf) {
            Err(XferError::Truncated { stage, buffered }) => {
                assert_eq!(stage, FrameStage::Signature);
                assert_eq!(buffered, SIGNATURE_LEN - 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert_eq!(codec.discarded(), 14);
        assert_eq!(codec.pending_discard, 0);
    }

    #[test]
    fn oversized_length_is_refused() {
        let config = ReceiverConfig::new().with_max_payload_len(4);
        let mut codec = XferFrameCodec::new(&config);
        let mut buf = wire(b"hello");

        match codec.decode(&mut buf) {
            Err(XferError::PayloadTooLarge { len, max }) => {
                assert_eq!(len, 5);
                assert_eq!(max, 4);
            }
            other => panic!("expected payload too large, got {:?}", other),
        }
    }

    #[test]
    fn eof_between_frames_is_clean() {
        let mut codec = XferFrameCodec::default();
        let mut buf = wire(b"hello");

        assert!(codec.decode_eof(&mut buf).unwrap().is_some());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_before_payload_starts_is_a_disconnect() {
        let mut codec = XferFrameCodec::default();
        let full = wire(b"hello");
        let mut buf = BytesMut::from(&full[..24]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert_eq!(codec.state().stage(), FrameStage::Payload);
    }

    #[test]
    fn eof_inside_header_or_payload_is_truncation() {
        let full = wire(b"hello");
        for (cut, stage) in [
            (2, FrameStage::Signature),
            (6, FrameStage::Length),
            (12, FrameStage::Checksum),
            (26, FrameStage::Payload),
        ] {
            let mut codec = XferFrameCodec::default();
            let mut buf = BytesMut::from(&full[..cut]);
            match codec.decode_eof(&mut buf) {
                Err(XferError::Truncated { stage: got, .. }) => assert_eq!(got, stage),
                other => panic!("cut at {}: expected truncation, got {:?}", cut, other),
            }
        }
    }
}
