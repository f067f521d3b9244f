//! Request/response shaping core.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → cors.rs      (resolve tenant once, apply CORS policy, preflight)
//!     → engine.rs    (forwarding engine)
//!         → director.rs  (outbound rewrite: headers, body, middleware)
//!         → transport.rs (exchange with the upstream)
//!         → rewriter.rs  (inbound rewrite, WebSocket passthrough)
//!     → response (or 101 + spliced upgrade tunnel)
//! ```
//!
//! # Design Decisions
//! - Resolver, pipelines, hooks and transport are fixed at build time and
//!   shared read-only between requests
//! - Per-request state lives in a `RequestContext` owned by the request task
//! - Request-leg failures never reach the upstream

pub mod builder;
mod cors;
mod director;
mod engine;
pub mod hooks;
mod rewriter;
pub mod transport;

use std::sync::Arc;

use axum::http::{request, response};

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::pipeline::Pipeline;
use crate::tenant::HostResolver;

pub use builder::{ProxyBuilder, DEFAULT_MAX_BODY_BYTES};
pub use hooks::{DefaultHooks, ErrorHooks};
pub use transport::{HttpTransport, Transport};

/// Configured shaping proxy. Cheap to clone; clones share configuration.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<Shared>,
}

struct Shared {
    resolver: Arc<dyn HostResolver>,
    request_pipeline: Pipeline<request::Parts>,
    response_pipeline: Pipeline<response::Parts>,
    hooks: Arc<dyn ErrorHooks>,
    transport: Arc<dyn Transport>,
    max_body_bytes: usize,
}

impl Proxy {
    pub fn builder(resolver: impl HostResolver + 'static) -> ProxyBuilder {
        ProxyBuilder::new(resolver)
    }

    fn report_request_error(&self, phase: &'static str, head: &request::Parts, err: &ProxyError) {
        tracing::warn!(
            phase,
            kind = err.kind(),
            error = %err,
            path = %head.uri.path(),
            "Request leg failed, not forwarding"
        );
        metrics::record_phase_failure(phase, err.kind());
        self.inner.hooks.on_request_error(head, err);
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("request_pipeline", &self.inner.request_pipeline)
            .field("response_pipeline", &self.inner.response_pipeline)
            .field("max_body_bytes", &self.inner.max_body_bytes)
            .finish_non_exhaustive()
    }
}
