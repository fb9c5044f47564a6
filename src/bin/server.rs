//! xfercheck receiver
//!
//! Listens for senders and verifies the MD5 checksum of every frame they send.
//!
//! Usage:
//!   xfercheck-server [--ip 0.0.0.0] [--port 8080] [--resync] [--max-payload BYTES]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xfercheck::{ReceiverConfig, SignaturePolicy, XferTcpServer, DEFAULT_PORT};

/// Receive frames over TCP and verify their checksums.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// IP address to which the socket will be bound
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    ip: IpAddr,

    /// Port to which the socket will be bound
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Skip unrecognized bytes until the next signature instead of closing the connection
    #[arg(long)]
    resync: bool,

    /// Largest payload length accepted, in bytes
    #[arg(long, default_value_t = u32::MAX)]
    max_payload: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let policy = if args.resync {
        SignaturePolicy::Resync
    } else {
        SignaturePolicy::Reject
    };
    let config = ReceiverConfig::new()
        .with_signature_policy(policy)
        .with_max_payload_len(args.max_payload);

    let bind = SocketAddr::new(args.ip, args.port);
    let server = match XferTcpServer::bind_with_config(bind, config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Error while binding socket to {}: {}", bind, e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    ExitCode::SUCCESS
}
