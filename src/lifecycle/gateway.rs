//! Gateway lifecycle.
//!
//! # Responsibilities
//! - Own the log sink, the layered router and the listener
//! - Drive `Unstarted → Serving → Draining → Stopped`
//! - Bound the drain by the configured grace period
//!
//! # Design Decisions
//! - `start` and `stop` are serialized; concurrent calls observe each other's result
//! - `stop` on anything but `Serving` is a no-op
//! - No restart: a stopped gateway stays stopped
//! - Lifecycle events go to the gateway's own sink, installed or not

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::config::validation::{validate_config, validate_time_format};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::middleware::{AccessRecorder, CorsPolicy};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{Shutdown, ShutdownOutcome};
use crate::lifecycle::startup::announce_routes;
use crate::net::listener::Listener;
use crate::observability::LogSink;
use crate::routing::{sorted_by_path, RouteDescriptor, Routes};

/// Extra time granted to the server task beyond the grace period before it is aborted.
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Where the gateway is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Serving,
    Draining,
    Stopped,
}

/// HTTP gateway: observability and lifecycle around application routes.
pub struct Gateway {
    config: GatewayConfig,
    sink: Arc<LogSink>,
    app: Router,
    routes: Vec<RouteDescriptor>,
    state: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
    server: Mutex<Option<JoinHandle<ShutdownOutcome>>>,
}

impl Gateway {
    /// Validate `config`, build its log sink and wrap `routes`.
    pub fn new(config: GatewayConfig, routes: Routes) -> Result<Self, GatewayError> {
        validate_config(&config)?;
        let sink = Arc::new(LogSink::configure(&config.log)?);
        Ok(Self::assemble(config, routes, sink))
    }

    /// Like [`Gateway::new`] but logging to an existing sink; `config.log` is ignored.
    pub fn with_sink(
        config: GatewayConfig,
        routes: Routes,
        sink: Arc<LogSink>,
    ) -> Result<Self, GatewayError> {
        validate_time_format(&config.access.custom_time_format)?;
        Ok(Self::assemble(config, routes, sink))
    }

    fn assemble(config: GatewayConfig, routes: Routes, sink: Arc<LogSink>) -> Self {
        let recorder = Arc::new(AccessRecorder::new(Arc::clone(&sink), &config.access));
        let (router, routes) = routes.into_parts();
        let app = HttpServer::build_router(router, recorder, Arc::new(CorsPolicy::permissive()));
        let (state, _) = watch::channel(LifecycleState::Unstarted);

        Self {
            config,
            sink,
            app,
            routes,
            state,
            shutdown: Shutdown::new(),
            server: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// The fully layered router, for serving in-process.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Registered routes sorted by path.
    pub fn list_routes(&self) -> Vec<RouteDescriptor> {
        sorted_by_path(&self.routes)
    }

    fn grace_period(&self) -> Duration {
        Duration::from_secs(self.config.shutdown.grace_period_secs)
    }

    /// Bind `"<ip>:<port>"` and serve in the background.
    ///
    /// Returns the bound address. A bind failure is logged and returned; the
    /// gateway stays `Unstarted`.
    pub async fn start(&self, ip: &str, port: u16) -> Result<SocketAddr, GatewayError> {
        let dispatch = self.sink.dispatch().clone();
        self.start_at(format!("{ip}:{port}"))
            .with_subscriber(dispatch)
            .await
    }

    async fn start_at(&self, address: String) -> Result<SocketAddr, GatewayError> {
        let mut server = self.server.lock().await;

        let state = self.state();
        if state != LifecycleState::Unstarted {
            return Err(GatewayError::InvalidState(state));
        }

        let listener = match Listener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                let source = e.into_io();
                tracing::error!(address = %address, error = %source, "Failed to bind address");
                return Err(GatewayError::Bind { address, source });
            }
        };
        let local_addr = listener.local_addr();

        announce_routes(&self.list_routes());

        let http = HttpServer::new(self.app.clone());
        let task = http
            .run(listener, self.shutdown.subscribe(), self.grace_period())
            .with_current_subscriber();
        *server = Some(tokio::spawn(task));

        self.state.send_replace(LifecycleState::Serving);
        tracing::info!(address = %local_addr, "Start service listen on");
        Ok(local_addr)
    }

    /// Drain and stop. Returns `None` when there was nothing to stop.
    ///
    /// Blocks at most for the grace period (plus a small slack); in-flight
    /// requests still running then are abandoned.
    pub async fn stop(&self) -> Option<ShutdownOutcome> {
        let dispatch = self.sink.dispatch().clone();
        self.stop_inner().with_subscriber(dispatch).await
    }

    async fn stop_inner(&self) -> Option<ShutdownOutcome> {
        let mut server = self.server.lock().await;

        let state = self.state();
        if state != LifecycleState::Serving {
            tracing::debug!(state = ?state, "Stop ignored");
            return None;
        }

        self.state.send_replace(LifecycleState::Draining);
        let grace_period = self.grace_period();
        tracing::info!(grace_period = ?grace_period, "Stopping service");
        self.shutdown.trigger();

        let outcome = match server.take() {
            Some(mut handle) => {
                match tokio::time::timeout(grace_period + DRAIN_SLACK, &mut handle).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Server task failed");
                        ShutdownOutcome::Forced { abandoned: 0 }
                    }
                    Err(_) => {
                        handle.abort();
                        ShutdownOutcome::Forced { abandoned: 0 }
                    }
                }
            }
            None => ShutdownOutcome::Clean,
        };

        match outcome {
            ShutdownOutcome::Clean => tracing::info!("Service stopped, all requests completed"),
            ShutdownOutcome::Forced { abandoned } => tracing::warn!(
                abandoned_connections = abandoned,
                "Grace period elapsed, service stopped forcibly"
            ),
        }

        self.state.send_replace(LifecycleState::Stopped);
        Some(outcome)
    }

    /// Resolve once the gateway has stopped.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Stopped).await;
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state())
            .field("routes", &self.routes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::MemoryWriter;

    fn gateway(routes: Routes) -> (Gateway, MemoryWriter) {
        let memory = MemoryWriter::new();
        let sink = Arc::new(LogSink::with_writer("debug", memory.clone()).unwrap());
        let gateway = Gateway::with_sink(GatewayConfig::default(), routes, sink).unwrap();
        (gateway, memory)
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let (gateway, _) = gateway(Routes::new());
        assert_eq!(gateway.stop().await, None);
        assert_eq!(gateway.state(), LifecycleState::Unstarted);
    }

    #[tokio::test]
    async fn full_cycle() {
        let (gateway, logs) = gateway(Routes::new().get("/ping", || async { "pong" }));

        let addr = gateway.start("127.0.0.1", 0).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(gateway.state(), LifecycleState::Serving);

        assert_eq!(gateway.stop().await, Some(ShutdownOutcome::Clean));
        assert_eq!(gateway.state(), LifecycleState::Stopped);
        gateway.wait_stopped().await;

        assert_eq!(gateway.stop().await, None);
        assert_eq!(gateway.state(), LifecycleState::Stopped);

        let output = logs.contents();
        assert!(output.contains("GET /ping"));
        assert!(output.contains("Start service listen on"));
    }

    #[tokio::test]
    async fn no_restart() {
        let (gateway, _) = gateway(Routes::new());
        gateway.start("127.0.0.1", 0).await.unwrap();
        let err = gateway.start("127.0.0.1", 0).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidState(LifecycleState::Serving)));

        gateway.stop().await;
        let err = gateway.start("127.0.0.1", 0).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidState(LifecycleState::Stopped)));
    }

    #[tokio::test]
    async fn bind_failure_leaves_gateway_unstarted() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let (gateway, logs) = gateway(Routes::new());
        let err = gateway.start("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_bind());
        assert_eq!(gateway.state(), LifecycleState::Unstarted);
        assert!(logs.contents().contains("Failed to bind address"));
    }

    #[test]
    fn default_config_builds_a_gateway() {
        let gateway = Gateway::new(GatewayConfig::default(), Routes::new()).unwrap();
        assert_eq!(gateway.state(), LifecycleState::Unstarted);
    }

    #[test]
    fn invalid_level_is_rejected() {
        let mut config = GatewayConfig::default();
        config.log.level = "bogus".to_string();
        let err = Gateway::new(config, Routes::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
