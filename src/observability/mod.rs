//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway + request path produce:
//!     → access_log.rs (one AccessRecord per request → access line + body line)
//!     → logging.rs (LogSink: level filter, field formatting, serialized writer)
//!     → rotation.rs (size/age/count rotation when logging to a file)
//! ```
//!
//! # Design Decisions
//! - One sink per gateway; global installation is opt-in
//! - Write failures are swallowed, never surfaced to requests
//! - Access lines are written whole under one lock

pub mod access_log;
pub mod logging;
pub mod rotation;

pub use access_log::{AccessFormat, AccessRecord};
pub use logging::{parse_level, LogSink, MemoryWriter};
pub use rotation::{RotatingFile, RotatingWriter, RotationPolicy};
