//! Include/exclude filtering of event types
//!
//! Pure predicate, no I/O. Exclusion always wins over inclusion.

use std::collections::HashSet;

/// Decides which event types participate in sync
#[derive(Debug, Clone)]
pub struct EventFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
    wildcard: bool,
}

impl EventFilter {
    /// Build a filter from include/exclude lists.
    ///
    /// An empty include list or a `*` entry means "include everything".
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        let include: HashSet<String> = include.into_iter().collect();
        let wildcard = include.is_empty() || include.contains("*");
        Self {
            include,
            exclude: exclude.into_iter().collect(),
            wildcard,
        }
    }

    /// Filter that includes everything
    pub fn allow_all() -> Self {
        Self::new(vec!["*".to_string()], vec![])
    }

    /// Whether an event of this type should be synced
    pub fn should_include(&self, event_type: &str) -> bool {
        if !self.wildcard && !self.include.contains(event_type) {
            return false;
        }
        !self.exclude.contains(event_type)
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> EventFilter {
        EventFilter::new(
            include.iter().map(|s| s.to_string()),
            exclude.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn test_wildcard_includes_everything() {
        let f = filter(&["*"], &[]);
        assert!(f.should_include("user.created"));
        assert!(f.should_include("anything.else"));
    }

    #[test]
    fn test_empty_include_treated_as_wildcard() {
        let f = filter(&[], &[]);
        assert!(f.should_include("user.created"));
    }

    #[test]
    fn test_include_list_restricts() {
        let f = filter(&["user.created"], &[]);
        assert!(f.should_include("user.created"));
        assert!(!f.should_include("post.created"));
    }

    #[test]
    fn test_exclude_removes_type() {
        let f = filter(&["*"], &["user.deleted"]);
        assert!(f.should_include("user.created"));
        assert!(!f.should_include("user.deleted"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        // A type in both lists is excluded
        let f = filter(&["user.created", "user.deleted"], &["user.deleted"]);
        assert!(f.should_include("user.created"));
        assert!(!f.should_include("user.deleted"));
    }

    #[test]
    fn test_exclude_wins_over_wildcard() {
        let f = filter(&["*"], &["audit.noise"]);
        assert!(!f.should_include("audit.noise"));
    }
}
