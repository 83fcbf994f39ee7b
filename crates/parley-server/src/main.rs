//! Parley Server
//!
//! HTTP server for chats, versioned documents and resumable response streams.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use parley_server::http;
use parley_server::{AppState, Config};

/// Parley chat server.
#[derive(Parser, Debug)]
#[command(name = "parley-server", about = "Parley chat, document and history server")]
struct Args {
    /// HTTP server address
    #[arg(long, default_value = "[::1]:3000")]
    http_addr: String,

    /// Largest history page a client may request
    #[arg(long, default_value = "100")]
    max_page_size: usize,

    /// Seconds a finished stream session is remembered
    #[arg(long, default_value = "60")]
    stream_retention_secs: u64,

    /// Seconds during which a finished reply is replayed on resume
    #[arg(long, default_value = "15")]
    resume_window_secs: u64,

    /// Parts buffered per stream before slow consumers lag
    #[arg(long, default_value = "1024")]
    stream_buffer: usize,

    /// Delay between parts of the built-in producer, in milliseconds
    #[arg(long, default_value = "50")]
    producer_chunk_delay_ms: u64,

    /// Daily message quota for guests
    #[arg(long, default_value = "20")]
    guest_messages_per_day: u32,

    /// Daily message quota for registered users
    #[arg(long, default_value = "50")]
    regular_messages_per_day: u32,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            http_addr: args.http_addr,
            max_page_size: args.max_page_size,
            stream_retention_secs: args.stream_retention_secs,
            resume_window_secs: args.resume_window_secs,
            stream_buffer: args.stream_buffer,
            producer_chunk_delay_ms: args.producer_chunk_delay_ms,
            guest_messages_per_day: args.guest_messages_per_day,
            regular_messages_per_day: args.regular_messages_per_day,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("parley=info".parse()?))
        .with_target(true)
        .init();

    let config = Config::from(args);
    let http_addr: SocketAddr = config.http_addr.parse()?;

    // Fails if the entitlement table is incomplete
    let state = AppState::new(config)?;

    // Garbage-collect finished stream sessions
    let gc_state = state.clone();
    let gc_every = state.config.stream_retention().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gc_every);
        loop {
            interval.tick().await;
            let removed = gc_state.streams.gc();
            if removed > 0 {
                debug!(removed, "Collected finished stream sessions");
            }
        }
    });

    let router = http::create_router(state);
    let listener = TcpListener::bind(http_addr).await?;

    info!(http_addr = %http_addr, "Parley server listening");

    axum::serve(listener, router).await?;

    Ok(())
}
