//! Request middleware installed on every route.
//!
//! Outermost first: access log, request ID, CORS, panic recovery.

pub mod access_log;
pub mod cors;

pub use access_log::{access_log_middleware, AccessRecorder};
pub use cors::{cors_middleware, CorsPolicy};
