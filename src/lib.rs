//! # xfercheck
//!
//! A point-to-point transfer checker over TCP. A sender streams the same
//! payload a configured number of times; a receiver parses every frame and
//! verifies the payload against the MD5 checksum the sender put in front of it.
//!
//! * **One-directional**: nothing is ever sent back to the sender
//! * **Fixed framing**: a 24-byte header in front of every payload
//! * **Integrity, not security**: MD5 detects corruption, it does not authenticate
//!
//! ## Quick Start
//!
//! ```rust
//! use tokio_util::codec::Decoder;
//! use xfercheck::{encode_frame, Frame, XferFrameCodec};
//!
//! let frame = Frame::new(b"hello".to_vec())?;
//! let mut buf = bytes::BytesMut::from(&encode_frame(&frame)[..]);
//!
//! let mut codec = XferFrameCodec::default();
//! let decoded = codec.decode(&mut buf)?.unwrap();
//!
//! assert_eq!(frame, decoded);
//! assert!(decoded.verify().is_match());
//! # Ok::<(), xfercheck::XferError>(())
//! ```
//!
//! ## Protocol Overview
//!
//! Frames follow each other back-to-back on a single connection:
//!
//! - SIGNATURE (4B): `0xFD 0xFD 0xFD 0xFD`
//! - LENGTH (4B LE): payload length as an unsigned 32-bit integer
//! - CHECKSUM (16B): raw MD5 digest of the payload
//! - PAYLOAD: exactly LENGTH bytes
//!
//! The receiver always consumes exactly `24 + LENGTH` bytes per frame, so a
//! corrupted payload is reported without losing the next frame boundary.
//!
//! ## Failure Handling
//!
//! | Condition              | Sender                  | Receiver                      |
//! |------------------------|-------------------------|-------------------------------|
//! | Connect failure        | retried, then fatal     | -                             |
//! | Write / read error     | aborts every run        | closes that connection only   |
//! | Unknown signature      | -                       | close, or resync if enabled   |
//! | Checksum mismatch      | -                       | logged, connection continues  |

pub mod codec;
pub mod config;
pub mod frame;
pub mod tcp;
pub mod types;

// Re-export main types for convenience
pub use types::{
    Checksum, ConnectionId, Frame, FrameHeader, FrameReport, FrameStage, Verdict, XferError,
    HEADER_LEN, SIGNATURE,
};

pub use codec::{DecodeState, XferFrameCodec};
pub use config::{ReceiverConfig, SenderConfig, SignaturePolicy, DEFAULT_PORT};
pub use frame::{encode_frame, encode_header};
pub use tcp::{send_payload, SendReport, XferTcpClient, XferTcpServer};
