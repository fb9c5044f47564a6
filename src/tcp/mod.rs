//! TCP transport for xfercheck

pub mod client;
pub mod server;

pub use client::{send_payload, SendReport, XferTcpClient};
pub use server::{handle_connection, CloseReason, ConnectionSummary, XferTcpServer};
