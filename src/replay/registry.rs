//! Handler registry: event-type dispatch for replay
//!
//! Maps an event type string to a typed deserialize-then-apply closure.
//! Populated at startup by the embedding application; replaces any runtime
//! introspection of handler signatures. Fields missing from a stored
//! payload are filled by `#[serde(default)]` on the handler's input type.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::{Result, SyncError};

/// A registered apply function over a stored event payload
pub type ApplyFn = Box<dyn Fn(&serde_json::Value) -> Result<()> + Send + Sync>;

/// Registry of replay handlers keyed by event type
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ApplyFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for an event type.
    ///
    /// The stored JSON payload is deserialized into `T` before invocation;
    /// a payload that does not deserialize is an invocation error for that
    /// record, not a panic.
    pub fn register<T, F>(&mut self, event_type: impl Into<String>, apply: F)
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let name = event_type.clone();
        self.handlers.insert(
            event_type,
            Box::new(move |data: &serde_json::Value| {
                let input: T = serde_json::from_value(data.clone()).map_err(|e| {
                    SyncError::Replay(format!("invalid payload for {}: {}", name, e))
                })?;
                apply(input)
            }),
        );
    }

    /// Register a handler that works on the raw JSON payload
    pub fn register_raw(&mut self, event_type: impl Into<String>, apply: ApplyFn) {
        self.handlers.insert(event_type.into(), apply);
    }

    /// Resolve an event type to its handler, if one is registered
    pub fn resolve(&self, event_type: &str) -> Option<&ApplyFn> {
        self.handlers.get(event_type)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct UserCreated {
        name: String,
        #[serde(default)]
        email: Option<String>,
    }

    #[test]
    fn test_typed_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut registry = HandlerRegistry::new();
        registry.register("user.created", move |event: UserCreated| {
            assert_eq!(event.name, "Test User");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let apply = registry.resolve("user.created").unwrap();
        apply(&json!({"name": "Test User", "email": "t@example.com"})).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let mut registry = HandlerRegistry::new();
        registry.register("user.created", |event: UserCreated| {
            assert!(event.email.is_none());
            Ok(())
        });

        let apply = registry.resolve("user.created").unwrap();
        apply(&json!({"name": "Test User"})).unwrap();
    }

    #[test]
    fn test_invalid_payload_is_error_not_panic() {
        let mut registry = HandlerRegistry::new();
        registry.register("user.created", |_: UserCreated| Ok(()));

        let apply = registry.resolve("user.created").unwrap();
        let err = apply(&json!({"unexpected": true})).unwrap_err();
        assert!(err.to_string().contains("user.created"));
    }

    #[test]
    fn test_unresolved_type() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("ghost.event").is_none());
        assert!(registry.is_empty());
    }
}
