//! Route registration and enumeration.
//!
//! # Responsibilities
//! - Register handlers on the underlying axum router
//! - Remember what was registered, in order, for diagnostics
//!
//! # Design Decisions
//! - axum cannot list its routes, so the registry records descriptors itself
//! - Enumeration is never consulted while handling requests

use std::fmt;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;

/// A registered route, as shown in the startup dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
}

impl RouteDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Application routes handed to the gateway.
#[derive(Default)]
pub struct Routes {
    router: Router,
    descriptors: Vec<RouteDescriptor>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.on(Method::GET, MethodFilter::GET, path, handler)
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.on(Method::POST, MethodFilter::POST, path, handler)
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.on(Method::PUT, MethodFilter::PUT, path, handler)
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.on(Method::DELETE, MethodFilter::DELETE, path, handler)
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.on(Method::PATCH, MethodFilter::PATCH, path, handler)
    }

    fn on<H, T>(mut self, method: Method, filter: MethodFilter, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.router = self.router.route(path, on(filter, handler));
        self.descriptors.push(RouteDescriptor::new(method, path));
        self
    }

    /// Routes in registration order.
    pub fn descriptors(&self) -> &[RouteDescriptor] {
        &self.descriptors
    }

    /// Split into the router and its descriptors.
    pub fn into_parts(self) -> (Router, Vec<RouteDescriptor>) {
        (self.router, self.descriptors)
    }
}

impl fmt::Debug for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routes")
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

/// Descriptors sorted by path; ties keep registration order.
pub fn sorted_by_path(descriptors: &[RouteDescriptor]) -> Vec<RouteDescriptor> {
    let mut sorted = descriptors.to_vec();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    sorted
}
