//! # Input Cursor
//!
//! Stateful input layer: runs one worker per configured source and keeps
//! each source's read position in step with confirmed delivery.
//!
//! Responsibilities:
//! - Exclusive per-source resources through [`statestore::Store`]
//! - [`Cursor`] reads and stages checkpoints; [`AckAggregator`] commits
//!   them once the pipeline acknowledges the events carrying them
//! - [`ManagedInput`] supervises workers, isolating failures and panics
//! - [`InputManager`] validates configuration and owns the shared store
//!
//! ## Usage Example
//!
//! ```ignore
//! use input_cursor::{Context, InputManager, ManagerConfig};
//!
//! let manager = InputManager::new(ManagerConfig::new("filestream"), FilestreamConfigure);
//! manager.init()?;
//! let input = manager.create(&input_config)?;
//! input.run(&Context::new("logs", shutdown.clone()), pipeline).await?;
//! ```
//!
//! ## Mock Testing
//!
//! ```ignore
//! use input_cursor::mock::{MockConfigure, MockSource};
//!
//! let configure = MockConfigure::new(vec![
//!     MockSource::new("a").publish_at("line", json!({"offset": 5})).wait_for_cancel(),
//! ]);
//! ```

mod ack;
mod context;
mod cursor;
mod error;
mod input;
mod managed;
mod manager;
pub mod metrics;
pub mod mock;
mod publisher;
mod recover;
mod update_op;

// Re-exports
pub use ack::AckAggregator;
pub use context::{Context, TestContext};
pub use cursor::Cursor;
pub use error::{BoxError, ErrorList, InputError, Result};
pub use input::{check_fips_capability, Input, LocalInput};
pub use managed::{InputState, ManagedInput};
pub use manager::{Configure, InputManager, ManagerConfig};
pub use metrics::{InputKind, InputMetrics, InputMetricsSnapshot, MetricsRegistry};
pub use publisher::Publisher;
pub use update_op::UpdateOp;
