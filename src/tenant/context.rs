//! Request-scoped state threaded through every phase.
//!
//! A `RequestContext` is created when the request enters the proxy and is
//! owned by that request's task. It memoizes the resolved tenant and holds
//! the original external identity of the request so the response phase sees
//! exactly what the request phase recorded.

use std::sync::Arc;

use axum::http::{header, request::Parts, HeaderMap, Method, Request};

use crate::error::ProxyError;
use crate::tenant::{HostResolver, TenantConfig};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Externally visible host and scheme of the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub scheme: String,
}

impl Origin {
    /// Derive the origin from forwarding headers, falling back to the request
    /// itself. `secure` reports whether the inbound connection was encrypted.
    pub fn from_head(head: &Parts, secure: bool) -> Self {
        let scheme = first_value(&head.headers, X_FORWARDED_PROTO)
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| if secure { "https" } else { "http" }.to_string());

        let host = first_value(&head.headers, X_FORWARDED_HOST)
            .map(str::to_string)
            .or_else(|| {
                head.headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .or_else(|| head.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        Self { host, scheme }
    }

    /// `scheme://host`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// First non-empty entry of a possibly comma-separated forwarding header.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Per-request resolution cache and derived identity.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    secure: bool,
    tenant: Option<Arc<TenantConfig>>,
    origin: Option<Origin>,
}

impl RequestContext {
    pub fn new(method: Method, secure: bool) -> Self {
        Self {
            method,
            secure,
            tenant: None,
            origin: None,
        }
    }

    /// Context for a request accepted on the plain TCP listener. The client
    /// controls the URI scheme (h2c `:scheme`), so it never marks the
    /// connection as encrypted; embedders terminating TLS use [`Self::new`].
    pub fn for_request<B>(req: &Request<B>) -> Self {
        Self::new(req.method().clone(), false)
    }

    /// Resolve the tenant, invoking the strategy only on the first call.
    pub async fn resolve(
        &mut self,
        resolver: &dyn HostResolver,
        head: &Parts,
    ) -> Result<Arc<TenantConfig>, ProxyError> {
        if let Some(tenant) = &self.tenant {
            return Ok(tenant.clone());
        }
        let tenant = Arc::new(resolver.resolve(head).await.map_err(ProxyError::Resolution)?);
        tracing::debug!(
            upstream = %tenant.upstream_host,
            prefix = %tenant.path_prefix,
            "Tenant resolved"
        );
        self.tenant = Some(tenant.clone());
        Ok(tenant)
    }

    /// The cached tenant, if resolution already happened.
    pub fn tenant(&self) -> Option<&Arc<TenantConfig>> {
        self.tenant.as_ref()
    }

    /// Record the original external identity. Write-once: later calls return
    /// the first captured value.
    pub fn capture_origin(&mut self, head: &Parts) -> &Origin {
        let secure = self.secure;
        self.origin
            .get_or_insert_with(|| Origin::from_head(head, secure))
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Method of the inbound request.
    pub fn method(&self) -> &Method {
        &self.method
    }
}
