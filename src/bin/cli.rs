//! Eventsync CLI
//!
//! Command-line interface for pull, send, replay, and inspection.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventsync::config::{parse_type_list, SyncConfig};
use eventsync::error::Result;
use eventsync::replay::{HandlerRegistry, NoopRuntime, ReplayEngine};
use eventsync::storage::log::{query_log, LogFilter};
use eventsync::storage::Storage;
use eventsync::sync::EventSyncer;
use eventsync::types::{PullFilters, ReplayFilters, SendFilters};

#[derive(Parser)]
#[command(name = "eventsync")]
#[command(about = "Event synchronization bridge CLI")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(
        long,
        env = "EVENTSYNC_DB_PATH",
        default_value = "~/.local/share/eventsync/events.db"
    )]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull events from the configured source
    Pull {
        /// Only pull events since this timestamp (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Comma-separated list of event types to pull
        #[arg(long)]
        types: Option<String>,
        /// Maximum number of events to pull
        #[arg(long, default_value = "100")]
        limit: i64,
        /// Show what would be synced without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Send stored events to the configured destination
    Send {
        /// Only send events since this timestamp (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Only send events of this type
        #[arg(long)]
        r#type: Option<String>,
        /// Maximum number of events to send
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Show what would be sent without transmitting
        #[arg(long)]
        dry_run: bool,
    },
    /// Replay imported events against the local runtime
    Replay {
        /// Only replay events since this timestamp (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Comma-separated list of event types to replay
        #[arg(long)]
        types: Option<String>,
        /// Maximum number of events per batch
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Show what would be replayed without replaying
        #[arg(long)]
        dry_run: bool,
        /// Keep replaying in batches until all events are processed
        #[arg(long = "continue")]
        continue_batches: bool,
    },
    /// Show sync status
    Status,
    /// Show recent operation log entries
    Log {
        /// Filter by operation (pull, send, store_event, replay)
        #[arg(long)]
        operation: Option<String>,
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: i64,
    },
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

    let cli = Cli::parse();

    // Expand ~ in path
    let db_path = shellexpand::tilde(&cli.db_path).to_string();
    let storage = Storage::open(db_path)?;
    let config = SyncConfig::from_env();
    let syncer = EventSyncer::new(storage.clone(), config)?;

    match cli.command {
        Commands::Pull {
            since,
            types,
            limit,
            dry_run,
        } => {
            let filters = PullFilters {
                since: parse_since(since.as_deref()),
                event_types: types.as_deref().map(parse_type_list),
                limit,
                dry_run,
            };

            if dry_run {
                println!("DRY RUN MODE - No events will be synced");
            }

            let result = syncer.pull(&filters).await;

            if !result.success {
                eprintln!("Failed to sync events: {}", result.message);
                std::process::exit(1);
            }

            println!("{}", result.message);

            if let Some(events) = result.events {
                // Dry run: show a sample of what would be synced
                for event in events.iter().take(5) {
                    println!(
                        "  {} {} {}",
                        event.id.as_deref().unwrap_or("N/A"),
                        event.event_type.as_deref().unwrap_or("N/A"),
                        event
                            .created_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "N/A".to_string()),
                    );
                }
                if result.events_count > 5 {
                    println!("  ...and {} more", result.events_count - 5);
                }
            }

            if let Some(details) = result.details {
                println!("Processed: {} events", details.processed);
                println!("Skipped: {} events (filtered or already synced)", details.skipped);
                if !details.errors.is_empty() {
                    eprintln!(
                        "Encountered {} errors during processing",
                        details.errors.len()
                    );
                }
            }
        }

        Commands::Send {
            since,
            r#type,
            limit,
            dry_run,
        } => {
            let filters = SendFilters {
                event_type: r#type,
                since: parse_since(since.as_deref()),
                limit,
            };

            if dry_run {
                println!("DRY RUN MODE - No events will be sent");
                let candidates = syncer.select_outgoing(&filters)?;
                for event in &candidates {
                    println!(
                        "  {} {} {}",
                        event.event_id,
                        event.event_type,
                        event.created_at.to_rfc3339()
                    );
                }
                println!("{} events would be sent", candidates.len());
                return Ok(());
            }

            let result = syncer.send(&filters).await;

            if !result.success {
                eprintln!("Failed to send events: {}", result.message);
                std::process::exit(1);
            }

            println!("{}", result.message);
            if let Some(response) = result.response {
                println!("Response: {}", serde_json::to_string_pretty(&response)?);
            }
        }

        Commands::Replay {
            since,
            types,
            limit,
            dry_run,
            continue_batches,
        } => {
            let filters = ReplayFilters {
                since: parse_since(since.as_deref()),
                event_types: types.as_deref().map(parse_type_list),
                limit,
                dry_run,
            };

            // Handlers are registered by embedding applications; the bare
            // CLI has none, so a non-dry-run replay will skip everything.
            let registry = HandlerRegistry::new();
            if !dry_run && registry.is_empty() {
                eprintln!(
                    "Warning: no event handlers registered; all events will be skipped. \
                     Register handlers via the library API."
                );
            }

            let mut engine = ReplayEngine::new(storage, registry, NoopRuntime);

            let report = if continue_batches {
                engine.replay_until_exhausted(&filters)
            } else {
                engine.replay_batch(&filters)
            };

            if let Some(ref candidates) = report.candidates {
                for candidate in candidates {
                    println!(
                        "  {} {} {}",
                        candidate.event_id,
                        candidate.event_type,
                        candidate.created_at.to_rfc3339()
                    );
                }
            }

            println!("{}", report.message);

            if !report.success || !report.errors.is_empty() {
                for error in &report.errors {
                    eprintln!("  {} ({}): {}", error.event_id, error.event_type, error.error);
                }
                std::process::exit(1);
            }
        }

        Commands::Status => {
            let report = syncer.status()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Log { operation, limit } => {
            let operation = match operation.as_deref().map(str::parse).transpose() {
                Ok(op) => op,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };

            let filter = LogFilter {
                operation,
                limit: Some(limit),
                ..Default::default()
            };
            let entries = storage.with_connection(|conn| query_log(conn, &filter))?;

            for entry in entries {
                println!(
                    "{} {:12} {:8} count={} {}",
                    entry.created_at.to_rfc3339(),
                    entry.operation.as_str(),
                    entry.status.as_str(),
                    entry.events_count,
                    entry
                        .details
                        .map(|d| d.to_string())
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

/// Parse an RFC 3339 timestamp option, exiting with a clear message on bad input
fn parse_since(since: Option<&str>) -> Option<DateTime<Utc>> {
    since.map(|s| match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            eprintln!("Invalid --since timestamp '{}': {}", s, e);
            std::process::exit(1);
        }
    })
}
