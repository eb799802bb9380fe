//! Routing subsystem.
//!
//! Dispatch is axum's job. This module only records what was registered so
//! the gateway can print a sorted route table at startup.

pub mod router;

pub use router::{sorted_by_path, RouteDescriptor, Routes};
