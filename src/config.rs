//! Environment-sourced configuration
//!
//! All settings come from `EVENTSYNC_*` variables; binaries layer clap
//! arguments with `env = ...` on top for paths and ports.

use serde::{Deserialize, Serialize};

/// A remote peer endpoint with its credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub credential: Option<String>,
}

/// Configuration for the sync bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote application events are pulled from
    pub source: Option<Endpoint>,
    /// Remote application events are pushed to
    pub destination: Option<Endpoint>,
    /// Key peers must present to this application's own endpoints
    pub api_key: Option<String>,
    /// Event types to sync; `*` means all
    pub include_events: Vec<String>,
    /// Event types never synced, even when included
    pub exclude_events: Vec<String>,
    pub batch_size: i64,
    /// Advisory only - not exercised by the transfer loop
    pub retry_attempts: u32,
    pub app_name: String,
    pub app_url: Option<String>,
    /// Role reported by the status endpoint (source | destination)
    pub sync_type: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            api_key: None,
            include_events: vec!["*".to_string()],
            exclude_events: vec![],
            batch_size: 100,
            retry_attempts: 3,
            app_name: "eventsync".to_string(),
            app_url: None,
            sync_type: "destination".to_string(),
        }
    }
}

impl SyncConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Self {
        let source = std::env::var("EVENTSYNC_SOURCE_URL").ok().map(|url| Endpoint {
            url,
            credential: std::env::var("EVENTSYNC_SOURCE_TOKEN").ok(),
        });

        let destination = std::env::var("EVENTSYNC_DESTINATION_URL")
            .ok()
            .map(|url| Endpoint {
                url,
                credential: std::env::var("EVENTSYNC_DESTINATION_KEY").ok(),
            });

        let include_events = std::env::var("EVENTSYNC_INCLUDE_EVENTS")
            .map(|v| parse_type_list(&v))
            .unwrap_or_else(|_| vec!["*".to_string()]);
        let exclude_events = std::env::var("EVENTSYNC_EXCLUDE_EVENTS")
            .map(|v| parse_type_list(&v))
            .unwrap_or_default();

        let batch_size = std::env::var("EVENTSYNC_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let retry_attempts = std::env::var("EVENTSYNC_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Self {
            source,
            destination,
            api_key: std::env::var("EVENTSYNC_API_KEY").ok(),
            include_events,
            exclude_events,
            batch_size,
            retry_attempts,
            app_name: std::env::var("EVENTSYNC_APP_NAME")
                .unwrap_or_else(|_| "eventsync".to_string()),
            app_url: std::env::var("EVENTSYNC_APP_URL").ok(),
            sync_type: std::env::var("EVENTSYNC_SYNC_TYPE")
                .unwrap_or_else(|_| "destination".to_string()),
        }
    }
}

/// Parse a comma-separated event type list, dropping empty segments
pub fn parse_type_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_type_list() {
        assert_eq!(
            parse_type_list("user.created, post.created"),
            vec!["user.created".to_string(), "post.created".to_string()]
        );
        assert_eq!(parse_type_list("*"), vec!["*".to_string()]);
        assert_eq!(parse_type_list(""), Vec::<String>::new());
        assert_eq!(parse_type_list(" a ,, b "), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.source.is_none());
        assert_eq!(config.include_events, vec!["*".to_string()]);
        assert!(config.exclude_events.is_empty());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.sync_type, "destination");
    }
}
