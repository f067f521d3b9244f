//! Construction-time configuration of a [`Proxy`].

use std::sync::Arc;

use axum::http::{request, response};

use crate::pipeline::{Middleware, Pipeline};
use crate::proxy::{DefaultHooks, ErrorHooks, HttpTransport, Proxy, Shared, Transport};
use crate::tenant::HostResolver;

/// Largest body buffered for interception unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Builder for [`Proxy`]. Middleware lists are append-only.
pub struct ProxyBuilder {
    resolver: Arc<dyn HostResolver>,
    request_pipeline: Pipeline<request::Parts>,
    response_pipeline: Pipeline<response::Parts>,
    hooks: Option<Arc<dyn ErrorHooks>>,
    transport: Option<Arc<dyn Transport>>,
    max_body_bytes: usize,
}

impl ProxyBuilder {
    pub fn new(resolver: impl HostResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            request_pipeline: Pipeline::new(),
            response_pipeline: Pipeline::new(),
            hooks: None,
            transport: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn request_middleware(mut self, middleware: impl Middleware<request::Parts> + 'static) -> Self {
        self.request_pipeline.push(Arc::new(middleware));
        self
    }

    pub fn response_middleware(mut self, middleware: impl Middleware<response::Parts> + 'static) -> Self {
        self.response_pipeline.push(Arc::new(middleware));
        self
    }

    pub fn error_hooks(mut self, hooks: impl ErrorHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Cap on buffered (and decoded) body size per leg.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn build(self) -> Proxy {
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::default()));
        tracing::debug!(
            request_middlewares = self.request_pipeline.len(),
            response_middlewares = self.response_pipeline.len(),
            max_body_bytes = self.max_body_bytes,
            "Proxy built"
        );
        Proxy {
            inner: Arc::new(Shared {
                resolver: self.resolver,
                request_pipeline: self.request_pipeline,
                response_pipeline: self.response_pipeline,
                hooks,
                transport,
                max_body_bytes: self.max_body_bytes,
            }),
        }
    }
}
