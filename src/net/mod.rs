//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept)
//!     → connection.rs (ID, open-connection count)
//!     → Hand off to HTTP layer
//! ```

pub mod connection;
pub mod listener;
