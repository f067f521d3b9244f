//! WebSocket (and generic protocol upgrade) passthrough.
//!
//! # Responsibilities
//! - Detect upgrade requests and `101 Switching Protocols` replies
//! - Hold on to both halves of the upgrade while the handshake is proxied
//! - Splice the upgraded client and upstream connections together
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - The handshake goes through the normal pipeline; only header rewrite
//!   applies, the body pipeline is bypassed
//! - Byte-level splice after the switch, frames are never parsed
//! - The tunnel runs on its own task and ends when either side closes

use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::{debug, warn};

/// True when the request asks to switch protocols.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

pub fn is_upgrade_response(status: StatusCode) -> bool {
    status == StatusCode::SWITCHING_PROTOCOLS
}

/// Detach the client side of a pending upgrade, if the request asked for one.
pub fn take_client_upgrade<B>(req: &mut Request<B>) -> Option<OnUpgrade> {
    if !is_upgrade_request(req.headers()) {
        return None;
    }
    req.extensions_mut().remove::<OnUpgrade>()
}

/// Detach the upstream side of an accepted upgrade.
pub fn take_upstream_upgrade<B>(resp: &mut Response<B>) -> Option<OnUpgrade> {
    resp.extensions_mut().remove::<OnUpgrade>()
}

/// Copy bytes both ways once both connections have switched protocols.
pub fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade) {
    tokio::spawn(async move {
        let (client, upstream) = match futures_util::future::try_join(client, upstream).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Upgrade handshake did not complete");
                return;
            }
        };
        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((to_upstream, to_client)) => {
                debug!(to_upstream, to_client, "Upgrade tunnel closed");
            }
            Err(e) => debug!(error = %e, "Upgrade tunnel ended with error"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_detects_websocket_request() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(is_upgrade_request(&headers));

        headers.remove(header::UPGRADE);
        assert!(!is_upgrade_request(&headers));
    }

    #[test]
    fn test_plain_request_has_no_upgrade() {
        let mut req = Request::new(());
        req.headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        assert!(take_client_upgrade(&mut req).is_none());
    }

    #[test]
    fn test_only_101_switches() {
        assert!(is_upgrade_response(StatusCode::SWITCHING_PROTOCOLS));
        assert!(!is_upgrade_response(StatusCode::OK));
    }
}
