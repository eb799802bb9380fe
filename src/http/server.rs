//! HTTP server setup and accept loop.
//!
//! # Responsibilities
//! - Wrap application routes in the gateway middleware stack
//! - Serve HTTP/1.1 and HTTP/2 on an accepted listener
//! - Stop accepting on shutdown, drain in-flight connections within a grace period
//!
//! # Design Decisions
//! - hyper-util's connection builder instead of `axum::serve` so the drain can be bounded
//! - Connections that outlive the grace period are aborted, not failed gracefully
//! - The peer address is inserted as `ConnectInfo` for the access log

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::middleware;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::Service;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::instrument::WithSubscriber;

use crate::http::middleware::{access_log_middleware, cors_middleware, AccessRecorder, CorsPolicy};
use crate::http::request::UuidRequestId;
use crate::http::response::panic_response;
use crate::lifecycle::shutdown::ShutdownOutcome;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;

/// HTTP server for the gateway.
pub struct HttpServer {
    app: Router,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server around an already layered router.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Wrap application routes in the middleware stack.
    ///
    /// The last layer added runs first: access log, request ID, CORS, panic recovery.
    pub fn build_router(
        routes: Router,
        recorder: Arc<AccessRecorder>,
        cors: Arc<CorsPolicy>,
    ) -> Router {
        routes
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(cors, cors_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(middleware::from_fn_with_state(recorder, access_log_middleware))
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
        grace_period: Duration,
    ) -> ShutdownOutcome {
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let app = self.app.clone();
                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        app.clone().call(request)
                    });

                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .into_owned();
                    let conn = graceful.watch(conn);

                    connections.spawn(
                        async move {
                            if let Err(e) = conn.await {
                                tracing::debug!(
                                    connection_id = %guard.id(),
                                    peer_addr = %peer,
                                    error = %e,
                                    "Connection closed with error"
                                );
                            }
                            drop(guard);
                        }
                        .with_current_subscriber(),
                    );
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => break,
            }
        }

        drop(listener);
        tracing::info!(
            connections = self.tracker.active_count(),
            grace_period = ?grace_period,
            "Stopped accepting, draining connections"
        );

        tokio::select! {
            _ = graceful.shutdown() => ShutdownOutcome::Clean,
            _ = tokio::time::sleep(grace_period) => {
                let abandoned = self.tracker.active_count();
                connections.abort_all();
                ShutdownOutcome::Forced { abandoned }
            }
        }
    }
}
