//! ResourceKey - deterministic identity of one source's persisted state

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Key addressing one resource in the store.
///
/// Format: `{input_type}::{user_id}::{source_name}`, or
/// `{input_type}::{source_name}` when no user id is configured. Two inputs
/// computing the same key share persisted progress.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Build the key for a source of an input
    pub fn new(input_type: &str, user_id: Option<&str>, source_name: &str) -> Self {
        let key = match user_id {
            Some(id) if !id.is_empty() => format!("{input_type}::{id}::{source_name}"),
            _ => format!("{input_type}::{source_name}"),
        };
        Self(Arc::from(key))
    }

    /// Wrap an already formatted key (e.g. read back from a backend)
    pub fn from_raw(raw: impl AsRef<str>) -> Self {
        Self(Arc::from(raw.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({:?})", self.0)
    }
}
