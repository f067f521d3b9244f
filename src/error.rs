//! Error types for the request/response shaping pipeline.
//!
//! Every phase of the director and rewriter returns `Result<_, ProxyError>`.
//! Request-leg errors are terminal for the request (nothing reaches the
//! upstream); response-leg errors go through the response error hook, which
//! may recover them.

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Boxed error used at plugin seams (resolver, middleware, transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while shaping a proxied exchange.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The resolution strategy could not map the request to a tenant.
    #[error("tenant resolution failed: {0}")]
    Resolution(#[source] BoxError),

    /// The response phase ran for a request that was never resolved.
    #[error("no tenant configuration was resolved for this exchange")]
    MissingTenant,

    /// A header could not be rewritten (malformed value or bad tenant field).
    #[error("header rewrite failed: {0}")]
    HeaderRewrite(String),

    /// The tenant's CORS policy cannot be turned into a usable layer.
    #[error("invalid CORS policy: {0}")]
    CorsPolicy(String),

    /// The body stream failed or exceeded the interception limit.
    #[error("failed to read body: {0}")]
    BodyRead(#[source] BoxError),

    /// The body could not be decompressed.
    #[error("failed to decode {encoding} body: {source}")]
    BodyDecode {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The body could not be compressed back into its wire encoding.
    #[error("failed to encode {encoding} body: {source}")]
    BodyEncode {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A registered middleware rejected the message.
    #[error("middleware `{name}` rejected the message: {source}")]
    Middleware {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The transport failed to exchange the request with the upstream.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] BoxError),
}

impl ProxyError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Resolution(_) => "resolution",
            ProxyError::MissingTenant => "missing_tenant",
            ProxyError::HeaderRewrite(_) => "header_rewrite",
            ProxyError::CorsPolicy(_) => "cors_policy",
            ProxyError::BodyRead(_) => "body_read",
            ProxyError::BodyDecode { .. } => "body_decode",
            ProxyError::BodyEncode { .. } => "body_encode",
            ProxyError::Middleware { .. } => "middleware",
            ProxyError::Upstream(_) => "upstream",
        }
    }

    /// Status returned to the original caller when this error ends the exchange.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match &self {
            ProxyError::Resolution(_) | ProxyError::MissingTenant => "Unknown tenant",
            ProxyError::Upstream(_) => "Upstream request failed",
            _ => "Proxy failed to process the message",
        };
        let mut response = Response::new(Body::from(message));
        *response.status_mut() = self.status_code();
        response
    }
}
