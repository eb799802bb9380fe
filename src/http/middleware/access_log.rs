//! Access log middleware.
//!
//! # Data Flow
//! ```text
//! Request
//!     → pre-read request body head (bounded), replay to handler
//!     → next.run()
//!     → wrap response body in RecordingBody
//!     → body finishes / fails / is dropped
//!     → AccessRecord → access line + body-preview line
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, request::Parts, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Local};

use crate::config::AccessLogConfig;
use crate::http::body::{capture_request, BodyOutcome, BodyPreview, RecordingBody, SharedPreview};
use crate::http::request::{real_ip, request_host, request_id};
use crate::http::response::HandlerError;
use crate::observability::{AccessFormat, AccessRecord, LogSink};

/// Renders finished exchanges into the gateway's sink.
#[derive(Debug)]
pub struct AccessRecorder {
    sink: Arc<LogSink>,
    format: AccessFormat,
}

impl AccessRecorder {
    pub fn new(sink: Arc<LogSink>, config: &AccessLogConfig) -> Self {
        Self {
            sink,
            format: AccessFormat::parse(&config.format, &config.custom_time_format),
        }
    }

    /// Emit the access line, then the body-preview line.
    pub fn emit(&self, record: &AccessRecord) {
        self.sink.write_line(&self.format.render(record));
        let line = record.body_line();
        self.sink.in_scope(|| tracing::info!("{}", line));
    }
}

/// Request-side facts captured before the handler runs.
struct PendingRecord {
    started: Instant,
    timestamp: DateTime<Local>,
    method: String,
    uri: String,
    path: String,
    protocol: String,
    host: String,
    remote_ip: String,
    referer: String,
    user_agent: String,
    request_id: Option<String>,
    content_length: Option<u64>,
    request_headers: HeaderMap,
    request_body: SharedPreview,
}

impl PendingRecord {
    fn from_request(
        parts: &Parts,
        started: Instant,
        timestamp: DateTime<Local>,
        request_body: SharedPreview,
    ) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let text = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            started,
            timestamp,
            method: parts.method.to_string(),
            uri: parts
                .uri
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_else(|| parts.uri.path().to_string()),
            path: parts.uri.path().to_string(),
            protocol: format!("{:?}", parts.version),
            host: request_host(parts),
            remote_ip: real_ip(&parts.headers, peer),
            referer: text(header::REFERER),
            user_agent: text(header::USER_AGENT),
            request_id: request_id(&parts.headers),
            content_length: parts
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            request_headers: parts.headers.clone(),
            request_body,
        }
    }

    fn complete(
        self,
        response: ResponseFacts,
        response_body: BodyPreview,
        outcome: BodyOutcome,
    ) -> AccessRecord {
        let request_body = self.request_body.snapshot();
        let error = match outcome {
            BodyOutcome::Complete => response.error,
            BodyOutcome::Failed(message) => Some(response.error.unwrap_or(message)),
            BodyOutcome::Abandoned => Some(
                response
                    .error
                    .unwrap_or_else(|| "response abandoned before completion".to_string()),
            ),
        };

        AccessRecord {
            timestamp: self.timestamp,
            method: self.method,
            uri: self.uri,
            path: self.path,
            protocol: self.protocol,
            host: self.host,
            remote_ip: self.remote_ip,
            referer: self.referer,
            user_agent: self.user_agent,
            status: response.status,
            latency: self.started.elapsed(),
            bytes_in: self.content_length.unwrap_or_else(|| request_body.total()),
            bytes_out: response_body.total(),
            request_id: self.request_id.or(response.request_id).unwrap_or_default(),
            error,
            request_headers: self.request_headers,
            response_content_type: response.content_type,
            request_body,
            response_body,
        }
    }
}

/// Response-side facts known once headers are produced.
struct ResponseFacts {
    status: u16,
    content_type: String,
    request_id: Option<String>,
    error: Option<String>,
}

/// Capture every exchange and log it once the response body is done.
pub async fn access_log_middleware(
    State(recorder): State<Arc<AccessRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let timestamp = Local::now();
    let (parts, body) = request.into_parts();
    let (body, request_preview) = capture_request(body).await;
    let pending = PendingRecord::from_request(&parts, started, timestamp, request_preview);

    let response = next.run(Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    let facts = ResponseFacts {
        status: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        request_id: request_id(&parts.headers),
        error: parts
            .extensions
            .get::<HandlerError>()
            .map(|e| e.message.clone()),
    };

    let body = RecordingBody::new(body, move |response_body, outcome| {
        let record = pending.complete(facts, response_body, outcome);
        recorder.emit(&record);
    });
    Response::from_parts(parts, Body::new(body))
}
