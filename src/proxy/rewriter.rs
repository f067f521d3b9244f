//! Inbound leg: reshape the upstream reply before it reaches the caller.

use axum::body::Body;
use axum::http::{header, response::Parts, Method, Response, StatusCode};
use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::body;
use crate::error::ProxyError;
use crate::http::websocket;
use crate::observability::metrics;
use crate::proxy::Proxy;
use crate::rewrite::{rewrite_response_head, rewrite_target_urls};
use crate::tenant::{Origin, RequestContext, TenantConfig};

/// Replies that carry no body by protocol.
fn is_bodyless(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

impl Proxy {
    /// Run the response phases in order. Errors have been offered to the
    /// response-error hook; an `Err` means the hook did not recover.
    #[instrument(name = "proxy.rewrite", skip_all, fields(status = %resp.status()))]
    pub(crate) async fn rewrite(
        &self,
        ctx: &RequestContext,
        resp: Response<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        let (mut head, body) = resp.into_parts();
        let (Some(tenant), Some(origin)) = (ctx.tenant(), ctx.origin()) else {
            return self.recover(head, body, ProxyError::MissingTenant);
        };

        if let Err(err) = rewrite_response_head(&mut head, tenant, origin) {
            return self.recover(head, body, err);
        }

        if websocket::is_upgrade_response(head.status) {
            debug!("Protocol upgrade, passing the stream through");
            head.headers.remove(header::CONTENT_LENGTH);
            return Ok(Response::from_parts(head, body));
        }

        if is_bodyless(ctx.method(), head.status) {
            return Ok(Response::from_parts(head, body));
        }

        let raw = match body::read_to_bytes(body, self.inner.max_body_bytes).await {
            Ok(raw) => raw,
            Err(err) => {
                body::set_content_length(&mut head.headers, 0);
                return self.recover(head, Body::empty(), err);
            }
        };

        match self.shape_response(&head, tenant, origin, raw.clone()) {
            Ok(wire) => {
                body::set_content_length(&mut head.headers, wire.len());
                Ok(Response::from_parts(head, Body::from(wire)))
            }
            Err(err) => {
                body::set_content_length(&mut head.headers, raw.len());
                self.recover(head, Body::from(raw), err)
            }
        }
    }

    fn shape_response(
        &self,
        head: &Parts,
        tenant: &TenantConfig,
        origin: &Origin,
        raw: Bytes,
    ) -> Result<Bytes, ProxyError> {
        let (decoded, encoder) = body::decode_bytes(&head.headers, raw, self.inner.max_body_bytes)?;
        let decoded_len = decoded.len();
        let decoded = rewrite_target_urls(decoded, tenant, origin);
        let shaped = self.inner.response_pipeline.run(head, tenant, decoded)?;
        metrics::record_body_rewrite("response", encoder.encoding().as_str(), decoded_len, shaped.len());
        encoder.write(shaped)
    }

    /// Offer a response-leg error to the hook. The message passed in is what
    /// the caller receives if the hook recovers.
    fn recover(
        &self,
        head: Parts,
        body: Body,
        err: ProxyError,
    ) -> Result<Response<Body>, ProxyError> {
        warn!(kind = err.kind(), error = %err, status = %head.status, "Response leg failed");
        metrics::record_phase_failure("rewrite", err.kind());
        match self.inner.hooks.on_response_error(&head, err) {
            None => {
                debug!("Response error recovered by hook");
                Ok(Response::from_parts(head, body))
            }
            Some(err) => Err(err),
        }
    }
}
