//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::observability::MemoryWriter;
use api_gateway::{Gateway, GatewayConfig, LogSink, Routes};

/// Access line template used by the tests: easy to split on spaces.
pub const TEST_FORMAT: &str =
    "ACCESS ${status} ${method} ${uri} ${bytes_in} ${bytes_out} ${remote_ip} ${id} ${error}\n";

/// A started gateway logging into memory.
pub struct TestGateway {
    pub gateway: Arc<Gateway>,
    pub addr: SocketAddr,
    pub logs: MemoryWriter,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.logs.lines()
    }

    /// Access lines written so far.
    pub fn access_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with("ACCESS "))
            .collect()
    }

    /// Body-preview lines written so far.
    pub fn body_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.contains(", reqBody["))
            .collect()
    }

    /// Wait until `count` access lines exist.
    pub async fn wait_for_access(&self, count: usize) -> Vec<String> {
        wait_until(|| self.access_lines().len() >= count).await;
        self.access_lines()
    }

    /// Wait for the body-preview line of `uri`.
    pub async fn body_line_for(&self, uri: &str) -> String {
        let prefix = format!(" {uri}, reqBody[");
        wait_until(|| self.body_lines().iter().any(|l| l.contains(&prefix))).await;
        self.body_lines()
            .into_iter()
            .find(|l| l.contains(&prefix))
            .unwrap()
    }
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Default test configuration: ephemeral port, test access format.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.ip = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.access.format = TEST_FORMAT.to_string();
    config
}

/// Build and start a gateway over `routes` with an in-memory sink.
pub async fn start_gateway(routes: Routes) -> TestGateway {
    start_gateway_with(test_config(), routes).await
}

pub async fn start_gateway_with(config: GatewayConfig, routes: Routes) -> TestGateway {
    let logs = MemoryWriter::new();
    let sink = Arc::new(LogSink::with_writer("info", logs.clone()).unwrap());
    let listener = config.listener.clone();
    let gateway = Arc::new(Gateway::with_sink(config, routes, sink).unwrap());
    let addr = gateway.start(&listener.ip, listener.port).await.unwrap();

    TestGateway {
        gateway,
        addr,
        logs,
    }
}

/// Client that does not pool connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
