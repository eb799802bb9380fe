//! Startup diagnostics.
//!
//! # Responsibilities
//! - Print the registered route table, one `"<METHOD> <PATH>"` line per route
//!
//! # Design Decisions
//! - Printed after the listener is bound, so the table reflects what is served

use crate::routing::RouteDescriptor;

/// Log each route, in the order given.
pub fn announce_routes(routes: &[RouteDescriptor]) {
    for route in routes {
        tracing::info!("{}", route);
    }
}
