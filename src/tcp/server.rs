use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::codec::{DecodeState, XferFrameCodec};
use crate::config::ReceiverConfig;
use crate::types::{ConnectionId, FrameReport, Verdict, XferError};

/// Why a connection ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseReason {
    /// Peer closed the stream on a frame boundary
    #[default]
    Eof,
    /// Peer closed the stream after a header but before any payload byte
    PeerDisconnected { expected: u32 },
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Eof => write!(f, "end of stream"),
            CloseReason::PeerDisconnected { expected } => {
                write!(f, "peer disconnected awaiting {} byte payload", expected)
            }
        }
    }
}

/// Per-connection tallies, returned when a connection ends cleanly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub frames: u64,
    pub verified: u64,
    pub mismatched: u64,
    /// Payload bytes received
    pub bytes: u64,
    /// Bytes skipped while resynchronizing on the signature
    pub discarded: u64,
    pub close: CloseReason,
    pub elapsed: Duration,
}

/// TCP receiver that verifies every frame it is sent
pub struct XferTcpServer {
    listener: TcpListener,
    config: ReceiverConfig,
}

impl XferTcpServer {
    /// Bind to the specified address
    pub async fn bind(addr: SocketAddr) -> Result<Self, XferError> {
        Self::bind_with_config(addr, ReceiverConfig::default()).await
    }

    /// Bind with custom receiver settings
    pub async fn bind_with_config(
        addr: SocketAddr,
        config: ReceiverConfig,
    ) -> Result<Self, XferError> {
        let listener = TcpListener::bind(addr).await?;
        info!("xfercheck TCP server bound to {}", addr);

        Ok(Self { listener, config })
    }

    /// Get the local address this server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, XferError> {
        self.listener.local_addr().map_err(XferError::Io)
    }

    /// Accept connections forever, only logging frame outcomes
    pub async fn run(self) -> Result<(), XferError> {
        self.serve(|_| std::future::ready(())).await
    }

    /// Accept connections forever, calling `on_frame` for every frame received
    pub async fn serve<F, Fut>(self, on_frame: F) -> Result<(), XferError>
    where
        F: Fn(FrameReport) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send,
    {
        info!("xfercheck TCP server starting...");

        let mut last_id: ConnectionId = 0;

        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    last_id += 1;
                    let id = last_id;
                    info!("Accepted connection {} from {}", id, peer);

                    let config = self.config.clone();
                    let on_frame = on_frame.clone();

                    tokio::spawn(async move {
                        match handle_connection(socket, id, peer, &config, on_frame).await {
                            Ok(summary) => info!(
                                "Connection {} from {} closed ({}): {} frames, {} ok, \
                                 {} mismatched, {} bytes in {:.2?}",
                                id,
                                peer,
                                summary.close,
                                summary.frames,
                                summary.verified,
                                summary.mismatched,
                                summary.bytes,
                                summary.elapsed,
                            ),
                            Err(e) => error!("Connection {} from {} terminated: {}", id, peer, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Read and verify frames from one connection until it closes.
///
/// Checksum mismatches are reported and the loop carries on with the next
/// frame. Any I/O or framing error ends the connection and is returned.
pub async fn handle_connection<S, F, Fut>(
    stream: S,
    id: ConnectionId,
    peer: SocketAddr,
    config: &ReceiverConfig,
    on_frame: F,
) -> Result<ConnectionSummary, XferError>
where
    S: AsyncRead + Unpin,
    F: Fn(FrameReport) -> Fut,
    Fut: Future<Output = ()>,
{
    let started = Instant::now();
    let mut framed = FramedRead::new(stream, XferFrameCodec::new(config));
    let mut summary = ConnectionSummary::default();

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let index = summary.frames;
        let length = frame.header.length;
        let verdict = frame.verify();

        summary.frames += 1;
        summary.bytes += frame.payload.len() as u64;

        match verdict {
            Verdict::Match => {
                summary.verified += 1;
                info!("Checksum ok from {} (frame {}, {} bytes)", peer, index, length);
            }
            Verdict::Mismatch { expected, actual } => {
                summary.mismatched += 1;
                warn!(
                    "Checksums do not match from {} (frame {}): expected {}, computed {}",
                    peer, index, expected, actual
                );
            }
        }

        on_frame(FrameReport {
            connection: id,
            peer,
            index,
            length,
            verdict,
        })
        .await;
    }

    let codec = framed.decoder();
    summary.discarded = codec.discarded();
    summary.close = match codec.state() {
        DecodeState::AwaitPayload { length, .. } => {
            CloseReason::PeerDisconnected { expected: length }
        }
        _ => CloseReason::Eof,
    };
    summary.elapsed = started.elapsed();
    debug!("Connection {} handler finished: {:?}", id, summary);

    Ok(summary)
}
