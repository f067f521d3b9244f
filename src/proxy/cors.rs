//! CORS gate in front of the forwarding engine.
//!
//! The tenant is resolved here, before the policy is known, and the result
//! stays cached on the context so the director never asks the resolver again.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{service_fn, Layer, ServiceExt};
use tracing::{debug, instrument};

use crate::proxy::Proxy;
use crate::tenant::RequestContext;

impl Proxy {
    #[instrument(name = "proxy.gate", skip_all, fields(path = %req.uri().path()))]
    pub(crate) async fn gate(&self, mut ctx: RequestContext, req: Request<Body>) -> Response<Body> {
        let (head, body) = req.into_parts();
        let tenant = match ctx.resolve(self.inner.resolver.as_ref(), &head).await {
            Ok(tenant) => tenant,
            Err(err) => {
                self.report_request_error("gate", &head, &err);
                return err.into_response();
            }
        };

        let layer = match tenant.cors_layer() {
            None => {
                return self.forward(ctx, Request::from_parts(head, body)).await;
            }
            Some(Err(err)) => {
                self.report_request_error("gate", &head, &err);
                return err.into_response();
            }
            Some(Ok(layer)) => layer,
        };
        debug!("Applying tenant CORS policy");

        let proxy = self.clone();
        let service = layer.layer(service_fn(move |req: Request<Body>| {
            let proxy = proxy.clone();
            let ctx = ctx.clone();
            async move { Ok::<_, Infallible>(proxy.forward(ctx, req).await) }
        }));
        match service.oneshot(Request::from_parts(head, body)).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, Method, StatusCode};

    use super::*;
    use crate::tenant::{CorsPolicy, TenantConfig};
    use crate::testing::{CountingResolver, MockTransport};

    fn policy() -> CorsPolicy {
        CorsPolicy {
            allowed_origins: vec!["https://app.example".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string()],
            allowed_headers: vec!["content-type".to_string()],
            ..CorsPolicy::default()
        }
    }

    fn cross_origin_get() -> Request<Body> {
        Request::builder()
            .uri("/api/items")
            .header(header::ORIGIN, "https://app.example")
            .body(Body::empty())
            .unwrap()
    }

    fn has_cors_headers(response: &Response<Body>) -> bool {
        response
            .headers()
            .keys()
            .any(|name| name.as_str().starts_with("access-control-"))
    }

    #[tokio::test]
    async fn test_disabled_cors_ignores_policy() {
        let tenant = TenantConfig::new("http", "up.internal").with_cors(false, Some(policy()));
        let proxy = Proxy::builder(CountingResolver::new(tenant))
            .transport(MockTransport::ok("ok"))
            .build();

        let response = proxy.handle(cross_origin_get()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!has_cors_headers(&response));
    }

    #[tokio::test]
    async fn test_enabled_without_policy_is_inert() {
        let tenant = TenantConfig::new("http", "up.internal").with_cors(true, None);
        let proxy = Proxy::builder(CountingResolver::new(tenant))
            .transport(MockTransport::ok("ok"))
            .build();

        let response = proxy.handle(cross_origin_get()).await;
        assert!(!has_cors_headers(&response));
    }

    #[tokio::test]
    async fn test_policy_headers_applied() {
        let tenant = TenantConfig::new("http", "up.internal").with_cors(true, Some(policy()));
        let proxy = Proxy::builder(CountingResolver::new(tenant))
            .transport(MockTransport::ok("ok"))
            .build();

        let response = proxy.handle(cross_origin_get()).await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
    }

    #[tokio::test]
    async fn test_preflight_answered_without_upstream() {
        let transport = Arc::new(MockTransport::ok("ok"));
        let tenant = TenantConfig::new("http", "up.internal").with_cors(true, Some(policy()));
        let proxy = Proxy::builder(CountingResolver::new(tenant))
            .transport(transport.clone())
            .build();

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/items")
            .header(header::ORIGIN, "https://app.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = proxy.handle(preflight).await;

        assert!(response.status().is_success());
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_tenant_resolved_once_per_request() {
        let resolver = Arc::new(CountingResolver::new(
            TenantConfig::new("http", "up.internal").with_cors(true, Some(policy())),
        ));
        let transport = Arc::new(MockTransport::ok("ok"));
        let proxy = Proxy::builder(resolver.clone())
            .transport(transport.clone())
            .build();

        let response = proxy.handle(cross_origin_get()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls(), 1);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_policy_fails_closed() {
        let bad = CorsPolicy {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            ..CorsPolicy::default()
        };
        let transport = Arc::new(MockTransport::ok("ok"));
        let tenant = TenantConfig::new("http", "up.internal").with_cors(true, Some(bad));
        let proxy = Proxy::builder(CountingResolver::new(tenant))
            .transport(transport.clone())
            .build();

        let response = proxy.handle(cross_origin_get()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(transport.calls(), 0);
    }
}
