//! Durable storage: synced event records and the operation log

pub mod connection;
pub mod events;
pub mod log;
pub mod migrations;

pub use connection::Storage;
pub use events::StoreOutcome;
pub use log::{LogFilter, Operation, OperationLogEntry, OperationStatus};
