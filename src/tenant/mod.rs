//! Tenant configuration and per-request resolution.
//!
//! # Data Flow
//! ```text
//! Inbound request head
//!     → context.rs (RequestContext, created once per request)
//!     → resolver.rs (HostResolver strategy, invoked at most once)
//!     → Arc<TenantConfig> cached in the context
//!     → read by CORS gate, director and rewriter
//! ```
//!
//! # Design Decisions
//! - TenantConfig is plain policy supplied by the resolver
//! - Request-derived identity (original host/scheme) lives in `Origin`,
//!   captured once by the director and read back by the rewriter
//! - No per-request state is shared between requests

pub mod context;
pub mod resolver;

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer, ExposeHeaders};

use crate::error::ProxyError;

pub use context::{Origin, RequestContext};
pub use resolver::{from_fn, FnResolver, HostResolver};

/// Routing and rewrite policy for one tenant.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Emit CORS headers for this tenant. Has no effect without `cors`.
    pub cors_enabled: bool,

    /// CORS policy applied by the pre-gate.
    pub cors: Option<CorsPolicy>,

    /// Domain forced onto every `Set-Cookie` returned by the upstream.
    pub cookie_domain: Option<String>,

    /// Host (and optional port) the request is forwarded to.
    pub upstream_host: String,

    /// Scheme used to reach the upstream (`http` or `https`).
    pub upstream_scheme: String,

    /// Host the upstream believes it is serving. Defaults to `upstream_host`.
    pub target_host: Option<String>,

    /// Scheme the upstream believes it is serving. Defaults to `upstream_scheme`.
    pub target_scheme: Option<String>,

    /// Externally visible prefix removed before forwarding.
    pub path_prefix: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            cors_enabled: false,
            cors: None,
            cookie_domain: None,
            upstream_host: String::new(),
            upstream_scheme: "http".to_string(),
            target_host: None,
            target_scheme: None,
            path_prefix: String::new(),
        }
    }
}

impl TenantConfig {
    /// Tenant forwarding to `scheme://host` with no other rewriting.
    pub fn new(upstream_scheme: impl Into<String>, upstream_host: impl Into<String>) -> Self {
        Self {
            upstream_scheme: upstream_scheme.into(),
            upstream_host: upstream_host.into(),
            ..Self::default()
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    pub fn with_target(mut self, scheme: impl Into<String>, host: impl Into<String>) -> Self {
        self.target_scheme = Some(scheme.into());
        self.target_host = Some(host.into());
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    pub fn with_cors(mut self, enabled: bool, policy: Option<CorsPolicy>) -> Self {
        self.cors_enabled = enabled;
        self.cors = policy;
        self
    }

    /// Host the upstream believes it runs under.
    pub fn target_host(&self) -> &str {
        self.target_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.upstream_host)
    }

    /// Scheme the upstream believes it runs under.
    pub fn target_scheme(&self) -> &str {
        self.target_scheme
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.upstream_scheme)
    }

    /// The CORS layer to apply, if CORS is enabled and a policy is configured.
    pub fn cors_layer(&self) -> Option<Result<CorsLayer, ProxyError>> {
        if !self.cors_enabled {
            return None;
        }
        self.cors.as_ref().map(CorsPolicy::to_layer)
    }

    /// Semantic problems with this tenant, empty when usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.upstream_host.is_empty() {
            problems.push("upstream_host must not be empty".to_string());
        }
        for (field, scheme) in [
            ("upstream_scheme", Some(self.upstream_scheme.as_str())),
            ("target_scheme", self.target_scheme.as_deref()),
        ] {
            if let Some(scheme) = scheme {
                if scheme != "http" && scheme != "https" {
                    problems.push(format!("{field} must be http or https, got {scheme:?}"));
                }
            }
        }
        if !self.path_prefix.is_empty() && !self.path_prefix.starts_with('/') {
            problems.push(format!("path_prefix {:?} must start with '/'", self.path_prefix));
        }
        if let Some(policy) = &self.cors {
            if let Err(e) = policy.to_layer() {
                problems.push(e.to_string());
            }
        }
        problems
    }
}

/// Cross-origin policy handed to the CORS engine.
///
/// `"*"` in any list means "any". Credentials cannot be combined with a
/// wildcard.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsPolicy {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

fn header_names(values: &[String]) -> Result<Vec<HeaderName>, ProxyError> {
    values
        .iter()
        .map(|v| {
            HeaderName::from_bytes(v.as_bytes())
                .map_err(|_| ProxyError::CorsPolicy(format!("invalid header name {v:?}")))
        })
        .collect()
}

impl CorsPolicy {
    /// Build the tower-http layer enforcing this policy.
    pub fn to_layer(&self) -> Result<CorsLayer, ProxyError> {
        let wildcard = is_wildcard(&self.allowed_origins)
            || is_wildcard(&self.allowed_methods)
            || is_wildcard(&self.allowed_headers)
            || is_wildcard(&self.exposed_headers);
        if self.allow_credentials && wildcard {
            return Err(ProxyError::CorsPolicy(
                "allow_credentials cannot be combined with \"*\"".to_string(),
            ));
        }

        let origins = if is_wildcard(&self.allowed_origins) {
            AllowOrigin::from(Any)
        } else {
            let values = self
                .allowed_origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o)
                        .map_err(|_| ProxyError::CorsPolicy(format!("invalid origin {o:?}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(values)
        };

        let methods = if is_wildcard(&self.allowed_methods) {
            AllowMethods::from(Any)
        } else {
            let methods = self
                .allowed_methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.as_bytes())
                        .map_err(|_| ProxyError::CorsPolicy(format!("invalid method {m:?}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowMethods::list(methods)
        };

        let headers = if is_wildcard(&self.allowed_headers) {
            AllowHeaders::from(Any)
        } else {
            AllowHeaders::list(header_names(&self.allowed_headers)?)
        };

        let exposed = if is_wildcard(&self.exposed_headers) {
            ExposeHeaders::from(Any)
        } else {
            ExposeHeaders::list(header_names(&self.exposed_headers)?)
        };

        let mut layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .expose_headers(exposed)
            .allow_credentials(self.allow_credentials);
        if let Some(secs) = self.max_age_secs {
            layer = layer.max_age(Duration::from_secs(secs));
        }
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults_to_upstream() {
        let tenant = TenantConfig::new("https", "up.internal");
        assert_eq!(tenant.target_host(), "up.internal");
        assert_eq!(tenant.target_scheme(), "https");

        let tenant = tenant.with_target("http", "app.local");
        assert_eq!(tenant.target_host(), "app.local");
        assert_eq!(tenant.target_scheme(), "http");
    }

    #[test]
    fn test_cors_layer_requires_flag_and_policy() {
        let policy = CorsPolicy {
            allowed_origins: vec!["https://app.example.com".into()],
            ..CorsPolicy::default()
        };
        let disabled = TenantConfig::new("http", "up").with_cors(false, Some(policy.clone()));
        assert!(disabled.cors_layer().is_none());

        let no_policy = TenantConfig::new("http", "up").with_cors(true, None);
        assert!(no_policy.cors_layer().is_none());

        let enabled = TenantConfig::new("http", "up").with_cors(true, Some(policy));
        assert!(matches!(enabled.cors_layer(), Some(Ok(_))));
    }

    #[test]
    fn test_credentials_with_wildcard_rejected() {
        let policy = CorsPolicy {
            allowed_origins: vec!["*".into()],
            allow_credentials: true,
            ..CorsPolicy::default()
        };
        assert!(matches!(policy.to_layer(), Err(ProxyError::CorsPolicy(_))));
    }

    #[test]
    fn test_problems_reports_every_issue() {
        let tenant = TenantConfig {
            upstream_scheme: "ftp".into(),
            path_prefix: "t1".into(),
            ..TenantConfig::default()
        };
        assert_eq!(tenant.problems().len(), 3);
        assert!(TenantConfig::new("http", "up").problems().is_empty());
    }
}
