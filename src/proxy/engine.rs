//! Forwarding engine: director → transport → rewriter, plus the upgrade splice.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::http::{headers, websocket};
use crate::observability::metrics;
use crate::proxy::Proxy;
use crate::tenant::RequestContext;

impl Proxy {
    /// Serve one inbound request end to end. Never fails: every error becomes
    /// a `502 Bad Gateway`.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();
        let ctx = RequestContext::for_request(&req);
        let response = self.gate(ctx, req).await;
        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    pub(crate) async fn forward(&self, mut ctx: RequestContext, mut req: Request<Body>) -> Response<Body> {
        let client_upgrade = websocket::take_client_upgrade(&mut req);

        let mut outbound = match self.direct(&mut ctx, req).await {
            Ok(outbound) => outbound,
            Err(err) => return err.into_response(),
        };
        headers::strip_hop_by_hop(outbound.headers_mut(), client_upgrade.is_some());

        let upstream = match self.inner.transport.round_trip(outbound).await {
            Ok(upstream) => upstream,
            Err(source) => {
                let err = ProxyError::Upstream(source);
                warn!(error = %err, "Upstream exchange failed");
                metrics::record_phase_failure("transport", err.kind());
                return err.into_response();
            }
        };
        debug!(status = %upstream.status(), "Upstream responded");

        let mut response = match self.rewrite(&ctx, upstream).await {
            Ok(response) => response,
            Err(err) => return err.into_response(),
        };

        let switching = websocket::is_upgrade_response(response.status());
        if switching {
            match (client_upgrade, websocket::take_upstream_upgrade(&mut response)) {
                (Some(client), Some(upstream)) => {
                    websocket::spawn_tunnel(client, upstream);
                    metrics::record_upgrade();
                }
                _ => {
                    let err = ProxyError::Upstream("upstream switched protocols without a matching client upgrade".into());
                    warn!(error = %err, "Cannot splice upgrade");
                    metrics::record_phase_failure("upgrade", err.kind());
                    return err.into_response();
                }
            }
        }
        headers::strip_hop_by_hop(response.headers_mut(), switching);
        response
    }
}
