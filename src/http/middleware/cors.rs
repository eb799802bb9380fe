//! Cross-origin policy.
//!
//! Static and maximally permissive: any origin, method and header, credentials
//! allowed, every response header exposed. Restrictions belong in front of the
//! gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

const WILDCARD: HeaderValue = HeaderValue::from_static("*");
const TRUE: HeaderValue = HeaderValue::from_static("true");

/// Headers added to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: HeaderValue,
    allow_credentials: bool,
}

impl CorsPolicy {
    /// Allow everything.
    pub fn permissive() -> Self {
        Self {
            allow_origin: WILDCARD,
            allow_methods: WILDCARD,
            allow_headers: WILDCARD,
            expose_headers: WILDCARD,
            allow_credentials: true,
        }
    }

    /// Decorate an actual (non-preflight) response. Headers set by the handler win.
    pub fn apply_simple(&self, headers: &mut HeaderMap) {
        headers.append(VARY, HeaderValue::from_name(ORIGIN));
        set_default(headers, ACCESS_CONTROL_ALLOW_ORIGIN, &self.allow_origin);
        if self.allow_credentials {
            set_default(headers, ACCESS_CONTROL_ALLOW_CREDENTIALS, &TRUE);
        }
        set_default(headers, ACCESS_CONTROL_EXPOSE_HEADERS, &self.expose_headers);
    }

    /// Build the answer to a preflight request.
    pub fn preflight(&self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.append(VARY, HeaderValue::from_name(ORIGIN));
        headers.append(VARY, HeaderValue::from_name(ACCESS_CONTROL_REQUEST_METHOD));
        headers.append(VARY, HeaderValue::from_name(ACCESS_CONTROL_REQUEST_HEADERS));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, TRUE);
        }
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        response
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

fn set_default(headers: &mut HeaderMap, name: HeaderName, value: &HeaderValue) {
    headers.entry(name).or_insert_with(|| value.clone());
}

/// Answer preflights directly; decorate everything else.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return policy.preflight();
    }

    let mut response = next.run(request).await;
    policy.apply_simple(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/items", get(|| async { "items" }))
            .route(
                "/custom",
                get(|| async { ([(ACCESS_CONTROL_ALLOW_ORIGIN, "https://a.example")], "x") }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Arc::new(CorsPolicy::permissive()),
                cors_middleware,
            ))
    }

    #[tokio::test]
    async fn simple_request_gets_headers() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/items")
                    .header(ORIGIN, "https://b.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[ACCESS_CONTROL_EXPOSE_HEADERS], "*");
        assert_eq!(headers[VARY], "origin");
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/items")
                    .header(ORIGIN, "https://b.example")
                    .header(ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers.get_all(VARY).iter().count(), 3);
    }

    #[tokio::test]
    async fn handler_headers_are_kept() {
        let response = app()
            .oneshot(Request::builder().uri("/custom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://a.example"
        );
    }
}
