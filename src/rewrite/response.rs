//! Inbound (response-side) rewriting back to the external identity.

use axum::http::{header, response::Parts, HeaderMap, HeaderValue};
use bytes::Bytes;
use memchr::memmem;
use url::Url;

use crate::error::ProxyError;
use crate::rewrite::external_prefix;
use crate::tenant::{Origin, TenantConfig};

/// Rewrite headers that encode the target identity.
pub fn rewrite_response_head(
    head: &mut Parts,
    tenant: &TenantConfig,
    origin: &Origin,
) -> Result<(), ProxyError> {
    rewrite_location(&mut head.headers, tenant, origin)?;
    rewrite_cookies(&mut head.headers, tenant)?;
    Ok(())
}

fn authority_matches(url: &Url, target: &str) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    match url.port() {
        Some(port) => format!("{host}:{port}").eq_ignore_ascii_case(target),
        None => host.eq_ignore_ascii_case(target),
    }
}

fn rewrite_location(
    headers: &mut HeaderMap,
    tenant: &TenantConfig,
    origin: &Origin,
) -> Result<(), ProxyError> {
    let Some(value) = headers.get(header::LOCATION) else {
        return Ok(());
    };
    let location = value
        .to_str()
        .map_err(|_| ProxyError::HeaderRewrite("Location is not valid UTF-8".to_string()))?;
    let prefix = external_prefix(tenant);

    let rewritten = if location.starts_with('/') && !location.starts_with("//") {
        if prefix.is_empty() {
            return Ok(());
        }
        format!("{prefix}{location}")
    } else {
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => return Ok(()),
            Err(e) => {
                return Err(ProxyError::HeaderRewrite(format!(
                    "invalid Location {location:?}: {e}"
                )))
            }
        };
        if !authority_matches(&url, tenant.target_host()) {
            return Ok(());
        }
        let mut rewritten = format!("{}{}{}", origin.base_url(), prefix, url.path());
        if let Some(query) = url.query() {
            rewritten.push('?');
            rewritten.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            rewritten.push('#');
            rewritten.push_str(fragment);
        }
        rewritten
    };

    let value = HeaderValue::from_str(&rewritten)
        .map_err(|_| ProxyError::HeaderRewrite(format!("invalid rewritten Location {rewritten:?}")))?;
    headers.insert(header::LOCATION, value);
    Ok(())
}

fn rewrite_cookies(headers: &mut HeaderMap, tenant: &TenantConfig) -> Result<(), ProxyError> {
    let Some(domain) = tenant.cookie_domain.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(());
    };
    let rewritten = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let cookie = value
                .to_str()
                .map_err(|_| ProxyError::HeaderRewrite("Set-Cookie is not valid UTF-8".to_string()))?;
            HeaderValue::from_str(&with_cookie_domain(cookie, domain))
                .map_err(|_| ProxyError::HeaderRewrite(format!("invalid cookie domain {domain:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if rewritten.is_empty() {
        return Ok(());
    }

    headers.remove(header::SET_COOKIE);
    for value in rewritten {
        headers.append(header::SET_COOKIE, value);
    }
    Ok(())
}

/// Replace (or add) the `Domain` attribute of a `Set-Cookie` value.
pub fn with_cookie_domain(cookie: &str, domain: &str) -> String {
    let mut attrs = cookie.split(';').map(str::trim);
    let mut out = attrs.next().unwrap_or_default().to_string();
    for attr in attrs.filter(|a| !a.is_empty()) {
        let key = attr.split_once('=').map_or(attr, |(k, _)| k).trim();
        if key.eq_ignore_ascii_case("domain") {
            continue;
        }
        out.push_str("; ");
        out.push_str(attr);
    }
    out.push_str("; Domain=");
    out.push_str(domain);
    out
}

/// Replace absolute target URLs in a decoded body with the external ones.
///
/// Returns the input unchanged (no copy) when nothing matches.
pub fn rewrite_target_urls(body: Bytes, tenant: &TenantConfig, origin: &Origin) -> Bytes {
    if body.is_empty() || tenant.target_host().is_empty() || origin.host.is_empty() {
        return body;
    }
    let from = format!("{}://{}", tenant.target_scheme(), tenant.target_host());
    let to = format!("{}{}", origin.base_url(), external_prefix(tenant));
    if from == to {
        return body;
    }
    match replace_all(&body, from.as_bytes(), to.as_bytes()) {
        Some(replaced) => Bytes::from(replaced),
        None => body,
    }
}

/// Replace every occurrence of `from` whose host ends where the match ends,
/// so `http://app.local` never matches inside `http://app.localhost`.
fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
    let mut out: Option<Vec<u8>> = None;
    let mut last = 0;
    for start in memmem::find_iter(haystack, from) {
        let end = start + from.len();
        if continues_host(&haystack[end..]) {
            continue;
        }
        let buf = out.get_or_insert_with(|| Vec::with_capacity(haystack.len()));
        buf.extend_from_slice(&haystack[last..start]);
        buf.extend_from_slice(to);
        last = end;
    }
    out.map(|mut buf| {
        buf.extend_from_slice(&haystack[last..]);
        buf
    })
}

fn continues_host(rest: &[u8]) -> bool {
    match rest {
        [c, ..] if c.is_ascii_alphanumeric() || *c == b'-' || *c == b'_' => true,
        [b'.' | b':', c, ..] => c.is_ascii_alphanumeric(),
        _ => false,
    }
}
