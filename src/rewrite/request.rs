//! Outbound (request-side) header rewriting.

use axum::http::{header, request::Parts, HeaderValue, Uri};

use crate::error::ProxyError;
use crate::rewrite::external_prefix;
use crate::tenant::context::{X_FORWARDED_HOST, X_FORWARDED_PROTO};
use crate::tenant::{Origin, TenantConfig};

/// Remove `prefix` from `path` on a segment boundary.
///
/// `/t1` strips `/t1` and `/t1/items` but leaves `/t10/items` alone. An
/// emptied path becomes `/`.
pub fn strip_path_prefix(path: &str, prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(prefix) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

/// Point the request at the tenant's upstream.
///
/// Strips the path prefix, sets scheme and authority to the upstream, sets
/// `Host` to the target identity and records the origin in
/// `X-Forwarded-Host`/`X-Forwarded-Proto` unless a previous hop already did.
pub fn rewrite_request_head(
    head: &mut Parts,
    tenant: &TenantConfig,
    origin: &Origin,
) -> Result<(), ProxyError> {
    let path = strip_path_prefix(head.uri.path(), external_prefix(tenant));
    let path_and_query = match head.uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    head.uri = Uri::builder()
        .scheme(tenant.upstream_scheme.as_str())
        .authority(tenant.upstream_host.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::HeaderRewrite(format!("invalid upstream URI: {e}")))?;

    let host = HeaderValue::from_str(tenant.target_host()).map_err(|_| {
        ProxyError::HeaderRewrite(format!("invalid target host {:?}", tenant.target_host()))
    })?;
    head.headers.insert(header::HOST, host);

    if !origin.host.is_empty() && !head.headers.contains_key(X_FORWARDED_HOST) {
        if let Ok(value) = HeaderValue::from_str(&origin.host) {
            head.headers.insert(X_FORWARDED_HOST, value);
        }
    }
    if !head.headers.contains_key(X_FORWARDED_PROTO) {
        if let Ok(value) = HeaderValue::from_str(&origin.scheme) {
            head.headers.insert(X_FORWARDED_PROTO, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn origin() -> Origin {
        Origin {
            host: "public.example.com".into(),
            scheme: "http".into(),
        }
    }

    #[test]
    fn test_strip_path_prefix() {
        assert_eq!(strip_path_prefix("/t1/items", "/t1"), "/items");
        assert_eq!(strip_path_prefix("/t1", "/t1"), "/");
        assert_eq!(strip_path_prefix("/t1/items", "/t1/"), "/items");
        assert_eq!(strip_path_prefix("/t10/items", "/t1"), "/t10/items");
        assert_eq!(strip_path_prefix("/other", "/t1"), "/other");
        assert_eq!(strip_path_prefix("/items", ""), "/items");
    }

    #[test]
    fn test_request_points_at_upstream() {
        let tenant = TenantConfig::new("https", "up.internal").with_path_prefix("/t1");
        let (mut head, _) = Request::builder()
            .uri("/t1/items?page=2")
            .header("host", "public.example.com")
            .body(())
            .unwrap()
            .into_parts();

        rewrite_request_head(&mut head, &tenant, &origin()).unwrap();

        assert_eq!(head.uri.scheme_str(), Some("https"));
        assert_eq!(head.uri.host(), Some("up.internal"));
        assert_eq!(head.uri.path(), "/items");
        assert_eq!(head.uri.query(), Some("page=2"));
        assert_eq!(head.headers["host"], "up.internal");
        assert_eq!(head.headers[X_FORWARDED_HOST], "public.example.com");
        assert_eq!(head.headers[X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn test_host_header_uses_target_identity() {
        let tenant = TenantConfig::new("http", "10.0.0.7:4433").with_target("https", "app.local");
        let (mut head, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

        rewrite_request_head(&mut head, &tenant, &origin()).unwrap();
        assert_eq!(head.uri.authority().map(|a| a.as_str()), Some("10.0.0.7:4433"));
        assert_eq!(head.headers["host"], "app.local");
    }

    #[test]
    fn test_existing_forwarding_headers_are_kept() {
        let tenant = TenantConfig::new("http", "up.internal");
        let (mut head, _) = Request::builder()
            .uri("/")
            .header(X_FORWARDED_HOST, "edge.example.com")
            .body(())
            .unwrap()
            .into_parts();

        rewrite_request_head(&mut head, &tenant, &origin()).unwrap();
        assert_eq!(head.headers[X_FORWARDED_HOST], "edge.example.com");
    }

    #[test]
    fn test_invalid_upstream_is_rewrite_error() {
        let tenant = TenantConfig::new("http", "bad host");
        let (mut head, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let err = rewrite_request_head(&mut head, &tenant, &origin()).unwrap_err();
        assert!(matches!(err, ProxyError::HeaderRewrite(_)));
    }
}
