//! api-gateway binary.
//!
//! ```text
//! api-gateway [--config gateway.toml] [--ip 0.0.0.0] [--port 8080]
//! ```
//!
//! Serves a `/health` route behind the gateway until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use clap::Parser;
use serde_json::{json, Value};

use api_gateway::config::loader::load_config;
use api_gateway::lifecycle::signals::shutdown_signal;
use api_gateway::{Gateway, GatewayConfig, Routes};

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "HTTP gateway with access logging")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen IP
    #[arg(long)]
    ip: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(ip) = cli.ip {
        config.listener.ip = ip;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    let listener = config.listener.clone();

    let routes = Routes::new().get("/health", health);
    let gateway = Arc::new(Gateway::new(config, routes)?);
    gateway.sink().install_global();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %listener.bind_address(),
        log_level = %gateway.sink().level(),
        "api-gateway starting"
    );

    gateway.start(&listener.ip, listener.port).await?;

    let stopper = Arc::clone(&gateway);
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.stop().await;
    });

    gateway.wait_stopped().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
