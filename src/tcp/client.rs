use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::SenderConfig;
use crate::frame::encode_header;
use crate::types::{FrameHeader, XferError, HEADER_LEN};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Totals for a completed send loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub runs: u32,
    /// Bytes written including headers
    pub bytes: u64,
    pub elapsed: Duration,
}

impl SendReport {
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.bytes as f64 / 1024.0 / 1024.0) / secs
    }
}

/// TCP sender that streams the same payload as repeated frames
pub struct XferTcpClient {
    stream: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl XferTcpClient {
    /// Connect using the default retry settings
    pub async fn connect(addr: SocketAddr) -> Result<Self, XferError> {
        Self::connect_with_config(addr, &SenderConfig::default()).await
    }

    /// Dial `addr`, retrying up to `config.connect_attempts` times in total
    pub async fn connect_with_config(
        addr: SocketAddr,
        config: &SenderConfig,
    ) -> Result<Self, XferError> {
        let attempts = config.connect_attempts.max(1);
        let mut retries_left = attempts;

        info!("Contacting server at {}", addr);

        loop {
            let outcome = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", config.connect_timeout),
                )),
            };

            match outcome {
                Ok(stream) => {
                    info!("Connected to {}", addr);
                    return Ok(Self {
                        stream: BufWriter::with_capacity(WRITE_BUFFER_SIZE, stream),
                        peer: addr,
                    });
                }
                Err(e) => {
                    retries_left -= 1;
                    if retries_left == 0 {
                        error!("Failed to connect to {}: {}", addr, e);
                        return Err(XferError::ConnectFailed {
                            addr,
                            attempts,
                            source: e,
                        });
                    }
                    warn!("Connection failed ({}), retrying...", e);
                    sleep(config.retry_interval).await;
                }
            }
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Write `runs` frames of `payload`.
    ///
    /// The checksum is computed once up front. The first write error aborts
    /// the whole loop.
    pub async fn send_runs(&mut self, payload: &[u8], runs: u32) -> Result<SendReport, XferError> {
        let header = encode_header(&FrameHeader::for_payload(payload)?);
        let started = Instant::now();
        let mut remaining = runs;

        while remaining > 0 {
            let run = runs - remaining + 1;
            self.write_frame(&header, payload)
                .await
                .map_err(|source| XferError::Send { run, source })?;
            debug!("Run: {}", run);
            remaining -= 1;
        }

        self.stream
            .flush()
            .await
            .map_err(|source| XferError::Send { run: runs, source })?;

        Ok(SendReport {
            runs,
            bytes: runs as u64 * (HEADER_LEN + payload.len()) as u64,
            elapsed: started.elapsed(),
        })
    }

    async fn write_frame(&mut self, header: &[u8; HEADER_LEN], payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(header).await?;
        self.stream.write_all(payload).await
    }

    /// Flush anything buffered and shut the connection down
    pub async fn close(mut self) -> Result<(), XferError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Connect, send `runs` frames of `payload` and close.
///
/// Any failure drops the connection immediately; nothing is resent.
pub async fn send_payload(
    addr: SocketAddr,
    payload: &[u8],
    runs: u32,
    config: &SenderConfig,
) -> Result<SendReport, XferError> {
    let mut client = XferTcpClient::connect_with_config(addr, config).await?;
    let report = client.send_runs(payload, runs).await?;
    client.close().await?;

    info!(
        "Sent {} runs ({} bytes) to {} in {:.2?} ({:.2} MiB/s)",
        report.runs,
        report.bytes,
        addr,
        report.elapsed,
        report.throughput_mib_s()
    );
    Ok(report)
}
