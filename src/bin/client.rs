//! xfercheck sender
//!
//! Loads a payload from disk and streams it to a receiver `--runs` times,
//! each time as a signed, length-prefixed, MD5-checked frame.
//!
//! Usage:
//!   xfercheck-client --ip 127.0.0.1 --port 8080 --payload data.bin [--runs 10]

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xfercheck::{send_payload, SenderConfig};

/// Stream a payload over TCP as repeated checksummed frames.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IP
    #[arg(long)]
    ip: IpAddr,

    /// Server port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Path of the payload to be sent
    #[arg(long)]
    payload: PathBuf,

    /// Number of times the payload should be sent
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    runs: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let payload = match tokio::fs::read(&args.payload).await {
        Ok(data) => data,
        Err(e) => {
            error!("Could not read payload file {}: {}", args.payload.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Loaded {} bytes from {}",
        payload.len(),
        args.payload.display()
    );

    let addr = SocketAddr::new(args.ip, args.port);
    match send_payload(addr, &payload, args.runs, &SenderConfig::default()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
