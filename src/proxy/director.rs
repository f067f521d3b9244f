//! Outbound leg: reshape the request before it is handed to the transport.

use axum::body::Body;
use axum::http::{header, request::Parts, Request};
use bytes::Bytes;
use tracing::{debug, instrument};

use crate::body::{self, BodyEncoder};
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::proxy::Proxy;
use crate::rewrite::rewrite_request_head;
use crate::tenant::RequestContext;

impl Proxy {
    /// Run the request phases in order. On failure the request-error hook has
    /// already been notified and the request must not be forwarded.
    #[instrument(name = "proxy.direct", skip_all, fields(method = %ctx.method()))]
    pub(crate) async fn direct(
        &self,
        ctx: &mut RequestContext,
        req: Request<Body>,
    ) -> Result<Request<Body>, ProxyError> {
        let (mut head, body) = req.into_parts();
        match self.shape_request(ctx, &mut head, body).await {
            Ok(body) => Ok(Request::from_parts(head, body)),
            Err(err) => {
                self.report_request_error("direct", &head, &err);
                Err(err)
            }
        }
    }

    async fn shape_request(
        &self,
        ctx: &mut RequestContext,
        head: &mut Parts,
        body: Body,
    ) -> Result<Body, ProxyError> {
        let tenant = ctx.resolve(self.inner.resolver.as_ref(), head).await?;
        let origin = ctx.capture_origin(head).clone();

        rewrite_request_head(head, &tenant, &origin)?;
        debug!(upstream = %head.uri, origin_host = %origin.host, "Request head rewritten");

        let declared_empty = body::declares_empty(&head.headers, &body);
        let (decoded, encoder): (Bytes, Option<BodyEncoder>) = if declared_empty {
            (Bytes::new(), None)
        } else {
            let (decoded, encoder) =
                body::decode(&head.headers, body, self.inner.max_body_bytes).await?;
            (decoded, Some(encoder))
        };

        let decoded_len = decoded.len();
        let shaped = self.inner.request_pipeline.run(head, &tenant, decoded)?;
        let wire = match encoder {
            Some(encoder) => {
                metrics::record_body_rewrite("request", encoder.encoding().as_str(), decoded_len, shaped.len());
                encoder.write(shaped)?
            }
            None => shaped,
        };

        if declared_empty && wire.is_empty() {
            head.headers.remove(header::CONTENT_LENGTH);
            head.headers.remove(header::TRANSFER_ENCODING);
            return Ok(Body::empty());
        }
        body::set_content_length(&mut head.headers, wire.len());
        Ok(Body::from(wire))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderValue, Method};

    use super::*;
    use crate::body::ContentEncoding;
    use crate::pipeline::from_fn;
    use crate::tenant::TenantConfig;
    use crate::testing::{CountingResolver, MockTransport, RecordingHooks};

    fn marker(tag: &'static str) -> impl crate::pipeline::Middleware<Parts> {
        from_fn(tag, move |_: &Parts, _: &TenantConfig, body: Bytes| {
            let mut out = body.to_vec();
            out.extend_from_slice(tag.as_bytes());
            Ok(Bytes::from(out))
        })
    }

    fn tenant() -> TenantConfig {
        TenantConfig::new("https", "up.internal").with_path_prefix("/t1")
    }

    #[tokio::test]
    async fn test_end_to_end_request_rewrite() {
        let proxy = Proxy::builder(CountingResolver::new(tenant()))
            .transport(MockTransport::ok(""))
            .build();
        let req = Request::builder()
            .uri("/t1/items")
            .header("host", "public.example.com")
            .body(Body::empty())
            .unwrap();

        let mut ctx = RequestContext::for_request(&req);
        let out = proxy.direct(&mut ctx, req).await.unwrap();

        assert_eq!(out.uri().host(), Some("up.internal"));
        assert_eq!(out.uri().scheme_str(), Some("https"));
        assert_eq!(out.uri().path(), "/items");
        assert!(out.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(ctx.origin().map(|o| o.host.as_str()), Some("public.example.com"));
        assert_eq!(ctx.origin().map(|o| o.scheme.as_str()), Some("http"));
    }

    #[tokio::test]
    async fn test_middlewares_apply_in_order_and_length_is_exact() {
        let proxy = Proxy::builder(CountingResolver::new(tenant()))
            .request_middleware(marker("[A]"))
            .request_middleware(marker("[B]"))
            .transport(MockTransport::ok(""))
            .build();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/t1/submit")
            .header(header::CONTENT_LENGTH, "4")
            .body(Body::from("data"))
            .unwrap();

        let mut ctx = RequestContext::for_request(&req);
        let out = proxy.direct(&mut ctx, req).await.unwrap();

        let lengths: Vec<_> = out.headers().get_all(header::CONTENT_LENGTH).iter().cloned().collect();
        let body = axum::body::to_bytes(out.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"data[A][B]");
        assert_eq!(lengths, vec![HeaderValue::from(body.len())]);
    }

    #[tokio::test]
    async fn test_gzip_request_is_reencoded() {
        let proxy = Proxy::builder(CountingResolver::new(tenant()))
            .request_middleware(marker("!"))
            .transport(MockTransport::ok(""))
            .build();
        let wire = BodyEncoder::new(ContentEncoding::Gzip)
            .write(Bytes::from_static(b"hello"))
            .unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/t1/")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::CONTENT_LENGTH, wire.len())
            .body(Body::from(wire))
            .unwrap();

        let mut ctx = RequestContext::for_request(&req);
        let out = proxy.direct(&mut ctx, req).await.unwrap();

        let declared: usize = out.headers()[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        let (head, body) = out.into_parts();
        let wire = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(declared, wire.len());

        let (decoded, _) = body::decode_bytes(&head.headers, wire, 1024).unwrap();
        assert_eq!(&decoded[..], b"hello!");
    }

    #[tokio::test]
    async fn test_middleware_failure_stops_chain_and_reports() {
        let hooks = Arc::new(RecordingHooks::default());
        let later = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = later.clone();
        let proxy = Proxy::builder(CountingResolver::new(tenant()))
            .request_middleware(from_fn("a", |_: &Parts, _: &TenantConfig, _: Bytes| {
                Err("A refused".into())
            }))
            .request_middleware(from_fn("b", move |_: &Parts, _: &TenantConfig, body: Bytes| {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(body)
            }))
            .error_hooks(hooks.clone())
            .transport(MockTransport::ok(""))
            .build();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/t1/")
            .body(Body::from("payload"))
            .unwrap();

        let mut ctx = RequestContext::for_request(&req);
        let err = proxy.direct(&mut ctx, req).await.unwrap_err();

        assert!(matches!(err, ProxyError::Middleware { ref name, .. } if name == "a"));
        assert_eq!(later.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(hooks.request_errors(), vec!["middleware `a` rejected the message: A refused"]);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_reported() {
        let hooks = Arc::new(RecordingHooks::default());
        let proxy = Proxy::builder(CountingResolver::failing("no such tenant"))
            .error_hooks(hooks.clone())
            .transport(MockTransport::ok(""))
            .build();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let mut ctx = RequestContext::for_request(&req);
        let err = proxy.direct(&mut ctx, req).await.unwrap_err();
        assert!(matches!(err, ProxyError::Resolution(_)));
        assert_eq!(hooks.request_errors().len(), 1);
        assert!(ctx.origin().is_none());
    }
}
