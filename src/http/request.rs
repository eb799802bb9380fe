//! Request metadata used by the access log.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Resolve the client address behind proxies
//! - Resolve the requested host
//!
//! # Design Decisions
//! - Request ID is assigned before application handlers run and echoed on the response
//! - Forwarding headers are trusted; the gateway sits behind a trusted boundary

use std::net::SocketAddr;

use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Issues UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-Ip`, then the peer.
pub fn real_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(real) = header_str(headers, X_REAL_IP) {
        return real.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Host the client asked for: `Host` header, else the URI authority.
pub fn request_host(parts: &Parts) -> String {
    header_str(&parts.headers, header::HOST.as_str())
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Request ID from the request headers, if any.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, X_REQUEST_ID).map(str::to_owned)
}
