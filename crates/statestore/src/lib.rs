//! # State Store
//!
//! Durable, concurrency-safe registry mapping a source's [`ResourceKey`] to
//! its persisted checkpoint and exclusivity lock.
//!
//! Responsibilities:
//! - Per-key locking with FIFO waiters and cancellation
//! - Atomic checkpoint commits, written through to a [`Backend`]
//! - TTL based reaping of released, idle resources
//!
//! ## Usage Example
//!
//! ```ignore
//! use statestore::{ResourceKey, Store};
//!
//! let store = Arc::new(Store::open(Arc::new(FileBackend::open("data/registry")?))?);
//! let guard = store.lock(&ResourceKey::new("filestream", None, "a.log"), &cancel).await?;
//! store.update_ttl(guard.resource(), Duration::from_secs(3600));
//! store.commit_checkpoint(guard.resource(), json!({"offset": 1024}))?;
//! drop(guard); // releases the lock
//! ```

mod backend;
mod error;
mod file;
mod key;
mod resource;
mod store;

pub use backend::{Backend, Entry, MemoryBackend};
pub use error::{Result, StoreError};
pub use file::FileBackend;
pub use key::ResourceKey;
pub use resource::Resource;
pub use store::{ResourceGuard, Store};
