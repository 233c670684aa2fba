//! Source trait - one independently tracked unit of collection
//!
//! A source is produced by an input type's configuration step (one file, one
//! polled endpoint, ...). Its name must be unique within an input instance and
//! is part of the persisted resource key, so it must stay stable across
//! restarts.

use std::fmt;
use std::sync::Arc;

/// Data source identity
pub trait Source: fmt::Debug + Send + Sync {
    /// Name unique within one input instance
    fn name(&self) -> &str;
}

/// Source identified by name only.
///
/// Uses `Arc<str>` internally so clones only bump a reference count.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NamedSource(Arc<str>);

impl NamedSource {
    /// Create a new source from its name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }
}

impl Source for NamedSource {
    fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NamedSource {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NamedSource {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Debug for NamedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedSource({:?})", self.0)
    }
}

impl fmt::Display for NamedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
