//! Sink implementations
//!
//! Contains LogSink, FileSink, and CaptureSink.

mod capture;
mod file;
mod log;

pub use self::capture::{CaptureHandle, CaptureSink};
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
