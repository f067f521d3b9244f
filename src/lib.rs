//! Multi-tenant shaping reverse proxy.
//!
//! Resolves a tenant per request, rewrites the request toward the tenant's
//! upstream, runs pluggable body middlewares on both legs, and rewrites the
//! reply so it looks like it came from the public host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ proxy (CORS gate) ──▶ director ──▶ transport ──▶ Upstream
//!                                            │                   │             │
//!                                        tenant::resolver    rewrite::request  │
//!                                        (once per request)  body codec        │
//!                                                            pipeline          │
//!     Client Response                                                          ▼
//!     ◀────────────── http::server ◀── hop-by-hop strip ◀── rewriter ◀──── reply
//!                          ▲                                 rewrite::response
//!                          └── 101: websocket splice          body codec + pipeline
//!
//!     Cross-cutting: config (TOML + hot reload), routing (static tenant table),
//!                    observability (tracing, Prometheus), lifecycle (startup/shutdown)
//! ```

pub mod body;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod rewrite;
pub mod routing;
pub mod tenant;

#[cfg(test)]
mod testing;

pub use config::schema::ProxyConfig;
pub use error::{BoxError, ProxyError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Middleware, Pipeline};
pub use proxy::{ErrorHooks, Proxy, ProxyBuilder, Transport};
pub use routing::StaticResolver;
pub use tenant::{HostResolver, Origin, RequestContext, TenantConfig};
