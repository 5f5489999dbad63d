//! Eventsync - point-to-point event synchronization bridge
//!
//! Pulls domain events from a remote event-sourced application, deduplicates
//! and persists them locally, and optionally replays them against a local
//! runtime or forwards them to a downstream peer.

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod processor;
pub mod replay;
pub mod storage;
pub mod sync;
pub mod types;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use storage::Storage;
pub use sync::EventSyncer;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
