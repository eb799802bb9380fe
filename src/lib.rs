//! HTTP gateway bootstrap with access logging.
//!
//! Wraps application routes with request IDs, a permissive CORS policy,
//! panic recovery and an access log that previews both bodies, then runs
//! them behind a listener with a bounded graceful shutdown.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::GatewayConfig;
pub use error::{ConfigError, GatewayError};
pub use http::HandlerError;
pub use lifecycle::{Gateway, LifecycleState, ShutdownOutcome};
pub use observability::LogSink;
pub use routing::{RouteDescriptor, Routes};
