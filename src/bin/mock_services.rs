//! Mock relay / analyzer / geocoder server
//!
//! Answers the HTTP contracts the monitor talks to so it can run without
//! any real backend.
//!
//! Usage:
//!   cargo run --bin mock-services -- --port 8787 --fail +912222222222
//!
//! Then point `[relay] url` at http://localhost:8787/api/send-sms,
//! `[anomaly] url` at http://localhost:8787/api/analyze and
//! `[geocode] url` at http://localhost:8787.

use clap::Parser;
use safezone_monitor::io::{serve_mock_services, MockServices};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock-services")]
#[command(about = "Local stand-ins for the SMS relay, movement analyzer and geocoder")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8787")]
    port: u16,

    /// Numbers the relay refuses (repeatable, normalized form e.g. +919876543210)
    #[arg(long = "fail")]
    failing_numbers: Vec<String>,

    /// Bearer token the relay insists on
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut services = MockServices::new().with_failing_numbers(args.failing_numbers.clone());
    if let Some(token) = &args.token {
        services = services.with_required_token(token.clone());
    }

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port))).await?;
    info!(port = %args.port, failing = ?args.failing_numbers, "mock_services_listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    serve_mock_services(listener, Arc::new(services), shutdown_rx).await
}
