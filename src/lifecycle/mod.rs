//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway::new (gateway.rs):
//!     Validate config → Build log sink → Layer routes
//!
//! Gateway::start:
//!     Bind listener → Print routes (startup.rs) → Serve in background → Serving
//!
//! Gateway::stop:
//!     Draining → Broadcast (shutdown.rs) → Stop accepting → Drain ≤ grace period → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller invokes Gateway::stop
//! ```

pub mod gateway;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use gateway::{Gateway, LifecycleState};
pub use shutdown::{Shutdown, ShutdownOutcome};
