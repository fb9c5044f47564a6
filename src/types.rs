//! Core types for the xfercheck wire protocol

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use md5::{Digest, Md5};
use thiserror::Error;

/// Frame start marker, `0xFDFDFDFD` read as a little-endian u32
pub const SIGNATURE: u32 = 0xFDFD_FDFD;

/// Size of the signature field in bytes
pub const SIGNATURE_LEN: usize = 4;

/// Size of the payload length field in bytes (u32, little-endian)
pub const LENGTH_LEN: usize = 4;

/// Size of the MD5 checksum field in bytes
pub const CHECKSUM_LEN: usize = 16;

/// Fixed header size preceding every payload
pub const HEADER_LEN: usize = SIGNATURE_LEN + LENGTH_LEN + CHECKSUM_LEN;

/// Identifier the receiver assigns to each accepted connection
pub type ConnectionId = u64;

/// Raw MD5 digest carried in the frame header
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum(pub [u8; CHECKSUM_LEN]);

impl Checksum {
    /// Compute the MD5 digest of `data`
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        let mut digest = [0u8; CHECKSUM_LEN];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

/// The fixed 24-byte prefix of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared payload length
    pub length: u32,
    /// MD5 of the payload as computed by the sender
    pub checksum: Checksum,
}

impl FrameHeader {
    pub fn new(length: u32, checksum: Checksum) -> Self {
        Self { length, checksum }
    }

    /// Build the header describing `payload`
    pub fn for_payload(payload: &[u8]) -> Result<Self, XferError> {
        let length = u32::try_from(payload.len()).map_err(|_| XferError::PayloadTooLarge {
            len: payload.len() as u64,
            max: u32::MAX as u64,
        })?;
        Ok(Self::new(length, Checksum::of(payload)))
    }
}

/// One signature + length + checksum + payload unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame whose header matches `payload`
    pub fn new(payload: impl Into<Bytes>) -> Result<Self, XferError> {
        let payload = payload.into();
        let header = FrameHeader::for_payload(&payload)?;
        Ok(Self { header, payload })
    }

    /// Recompute the payload digest and compare it to the transmitted one
    pub fn verify(&self) -> Verdict {
        let actual = Checksum::of(&self.payload);
        if actual == self.header.checksum {
            Verdict::Match
        } else {
            Verdict::Mismatch {
                expected: self.header.checksum,
                actual,
            }
        }
    }
}

/// Outcome of checking a received payload against its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch { expected: Checksum, actual: Checksum },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// Everything the receiver learned about one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub connection: ConnectionId,
    pub peer: SocketAddr,
    /// Zero-based position of the frame on its connection
    pub index: u64,
    pub length: u32,
    pub verdict: Verdict,
}

/// Field the receiver was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Signature,
    Length,
    Checksum,
    Payload,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Signature => "signature",
            FrameStage::Length => "length",
            FrameStage::Checksum => "checksum",
            FrameStage::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while sending or receiving frames
#[derive(Debug, Error)]
pub enum XferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("signature not recognized: expected {:#010x}, got {got:#010x}", SIGNATURE)]
    InvalidSignature { got: u32 },

    #[error("payload of {len} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { len: u64, max: u64 },

    #[error("stream ended while reading {stage} ({buffered} bytes buffered)")]
    Truncated { stage: FrameStage, buffered: usize },

    #[error("write failed during run {run}: {source}")]
    Send {
        run: u32,
        #[source]
        source: std::io::Error,
    },
}
