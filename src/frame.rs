//! Byte-level encoding of xfercheck frames
//!
//! ```text
//! offset  size  field
//! 0       4     signature (0xFDFDFDFD)
//! 4       4     payload length (u32 LE)
//! 8       16    MD5 of the payload
//! 24      N     payload
//! ```

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{
    Checksum, Frame, FrameHeader, CHECKSUM_LEN, HEADER_LEN, LENGTH_LEN, SIGNATURE, SIGNATURE_LEN,
};

/// Signature as it appears on the wire
pub const SIGNATURE_BYTES: [u8; SIGNATURE_LEN] = SIGNATURE.to_le_bytes();

/// Serialize a header into its fixed 24-byte wire form
pub fn encode_header(header: &FrameHeader) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..SIGNATURE_LEN].copy_from_slice(&SIGNATURE_BYTES);
    LittleEndian::write_u32(&mut out[SIGNATURE_LEN..SIGNATURE_LEN + LENGTH_LEN], header.length);
    out[SIGNATURE_LEN + LENGTH_LEN..].copy_from_slice(header.checksum.as_bytes());
    out
}

/// Append a complete frame to `dst`
pub fn encode_frame_into(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(HEADER_LEN + frame.payload.len());
    dst.put_slice(&encode_header(&frame.header));
    dst.put_slice(&frame.payload);
}

/// Encode a frame into a fresh buffer
pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.payload.len());
    encode_frame_into(frame, &mut buf);
    buf.freeze()
}

pub(crate) fn read_signature(src: &[u8]) -> u32 {
    LittleEndian::read_u32(&src[..SIGNATURE_LEN])
}

pub(crate) fn read_length(src: &[u8]) -> u32 {
    LittleEndian::read_u32(&src[..LENGTH_LEN])
}

pub(crate) fn read_checksum(src: &[u8]) -> Checksum {
    let mut digest = [0u8; CHECKSUM_LEN];
    digest.copy_from_slice(&src[..CHECKSUM_LEN]);
    Checksum(digest)
}

/// Offset of the first complete signature in `haystack`
pub fn find_signature(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SIGNATURE_LEN)
        .position(|window| window == SIGNATURE_BYTES)
}
