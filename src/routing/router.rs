//! Tenant lookup from a static, hot-swappable table.
//!
//! # Responsibilities
//! - Compile `[[tenants]]` entries into matchers
//! - Look up the tenant for a request head
//! - Serve as the proxy's `HostResolver` when tenants come from config
//!
//! # Design Decisions
//! - Tables are immutable; reload builds a new one and swaps it atomically
//! - Sorted by priority once, first match wins
//! - Explicit no-match error rather than a silent default

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::http::request::Parts;
use thiserror::Error;

use crate::config::{ProxyConfig, TenantEntry};
use crate::error::BoxError;
use crate::routing::matcher::{request_host, AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::tenant::{HostResolver, TenantConfig};

/// No table entry matched the request.
#[derive(Debug, Error)]
#[error("no tenant matches host {host:?} and path {path:?}")]
pub struct NoTenant {
    pub host: Option<String>,
    pub path: String,
}

#[derive(Debug)]
struct TenantRoute {
    name: String,
    matcher: AndMatcher,
    tenant: TenantConfig,
}

/// Compiled tenant table, highest priority first.
#[derive(Debug, Default)]
pub struct TenantTable {
    routes: Vec<TenantRoute>,
}

impl TenantTable {
    pub fn from_entries(entries: &[TenantEntry]) -> Self {
        let mut sorted: Vec<&TenantEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = sorted
            .into_iter()
            .map(|entry| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if let Some(host) = &entry.host {
                    matchers.push(Box::new(HostMatcher::new(host)));
                }
                if !entry.tenant.path_prefix.is_empty() {
                    matchers.push(Box::new(PathPrefixMatcher::new(&entry.tenant.path_prefix)));
                }
                TenantRoute {
                    name: entry.name.clone(),
                    matcher: AndMatcher::new(matchers),
                    tenant: entry.tenant.clone(),
                }
            })
            .collect();
        Self { routes }
    }

    /// First matching entry: its name and shaping parameters.
    pub fn lookup(&self, head: &Parts) -> Option<(&str, &TenantConfig)> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(head))
            .map(|route| (route.name.as_str(), &route.tenant))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// `HostResolver` backed by a [`TenantTable`] that can be replaced at runtime.
pub struct StaticResolver {
    table: ArcSwap<TenantTable>,
}

impl StaticResolver {
    pub fn new(table: TenantTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(TenantTable::from_entries(&config.tenants))
    }

    /// Swap in a new table. In-flight lookups finish against the old one.
    pub fn replace(&self, table: TenantTable) {
        tracing::info!(tenants = table.len(), "Tenant table replaced");
        self.table.store(Arc::new(table));
    }

    /// Snapshot of the current table.
    pub fn table(&self) -> Arc<TenantTable> {
        self.table.load_full()
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, head: &Parts) -> Result<TenantConfig, BoxError> {
        let table = self.table.load();
        match table.lookup(head) {
            Some((name, tenant)) => {
                tracing::debug!(tenant = name, "Tenant matched");
                Ok(tenant.clone())
            }
            None => Err(Box::new(NoTenant {
                host: request_host(head),
                path: head.uri.path().to_string(),
            })),
        }
    }
}
