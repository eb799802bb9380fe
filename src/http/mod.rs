//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper-util connection, graceful drain)
//!     → middleware/access_log.rs (capture request, observe response)
//!     → request.rs (request ID)
//!     → middleware/cors.rs (preflight / CORS headers)
//!     → application handler (panics caught, see response.rs)
//!     → body.rs (bounded preview of both bodies)
//!     → Send to client, then log
//! ```

pub mod body;
pub mod content;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::HandlerError;
pub use server::HttpServer;
