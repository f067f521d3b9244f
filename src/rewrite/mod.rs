//! Header and URL rewrite rules.
//!
//! Pure functions over message heads and decoded bodies. They never resolve
//! tenants themselves: the director and rewriter hand in the cached
//! `TenantConfig` and the captured `Origin`.
//!
//! # Data Flow
//! ```text
//! outbound: request.rs  (strip prefix, point at upstream, forwarding headers)
//! inbound:  response.rs (Location, Set-Cookie, absolute target URLs in body)
//! ```

pub mod request;
pub mod response;

pub use request::{rewrite_request_head, strip_path_prefix};
pub use response::{rewrite_response_head, rewrite_target_urls, with_cookie_domain};

use crate::tenant::TenantConfig;

/// Path prefix as it is re-added on externally visible URLs.
pub(crate) fn external_prefix(tenant: &TenantConfig) -> &str {
    tenant.path_prefix.trim_end_matches('/')
}
