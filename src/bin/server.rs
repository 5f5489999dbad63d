//! Eventsync HTTP server
//!
//! Serves the events endpoints and status for peers. Run with:
//! eventsync-server --port 8920

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventsync::api;
use eventsync::config::SyncConfig;
use eventsync::error::Result;
use eventsync::storage::Storage;
use eventsync::sync::EventSyncer;

#[derive(Parser, Debug)]
#[command(name = "eventsync-server")]
#[command(about = "Event synchronization bridge HTTP server")]
#[command(version)]
struct Args {
    /// Database path
    #[arg(
        long,
        env = "EVENTSYNC_DB_PATH",
        default_value = "~/.local/share/eventsync/events.db"
    )]
    db_path: String,

    /// Port to listen on
    #[arg(long, env = "EVENTSYNC_PORT", default_value = "8920")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Expand ~ in path
    let db_path = shellexpand::tilde(&args.db_path).to_string();
    let storage = Storage::open(db_path)?;

    let config = SyncConfig::from_env();
    if config.api_key.is_none() {
        tracing::warn!(
            "EVENTSYNC_API_KEY is not set; peers cannot authenticate and all \
             events endpoints will reject requests"
        );
    }

    let syncer = Arc::new(EventSyncer::new(storage, config)?);
    let app = api::router(syncer);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(addr = %addr, "eventsync server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
