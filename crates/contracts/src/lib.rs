//! # Contracts
//!
//! Frozen interface contracts shared by the stateful input layer and its
//! collaborators. All business crates can only depend on this crate, reverse
//! dependencies are prohibited.
//!
//! ## Delivery model
//! - Events are published through a [`PipelineClient`]
//! - Each client receives [`AckBatch`] messages for the contiguous prefix of
//!   its events accepted downstream, in production order

mod config;
mod error;
mod event;
mod pipeline;
mod sink;
mod source;
mod status;

pub use config::*;
pub use error::*;
pub use event::*;
pub use pipeline::*;
pub use sink::*;
pub use source::{NamedSource, Source};
pub use status::*;
