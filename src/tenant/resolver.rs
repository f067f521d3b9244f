//! Pluggable tenant resolution strategy.
//!
//! The embedder supplies a `HostResolver` at construction. It may consult a
//! static table, a database or a remote service; the pipeline guarantees it is
//! called at most once per request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;

use crate::error::BoxError;
use crate::tenant::TenantConfig;

/// Maps an inbound request head to its tenant configuration.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, head: &Parts) -> Result<TenantConfig, BoxError>;
}

#[async_trait]
impl<R: HostResolver + ?Sized> HostResolver for Arc<R> {
    async fn resolve(&self, head: &Parts) -> Result<TenantConfig, BoxError> {
        (**self).resolve(head).await
    }
}

/// Resolver backed by a synchronous closure. Created with [`from_fn`].
pub struct FnResolver<F> {
    f: F,
}

/// Wrap a synchronous lookup as a [`HostResolver`].
pub fn from_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&Parts) -> Result<TenantConfig, BoxError> + Send + Sync,
{
    FnResolver { f }
}

#[async_trait]
impl<F> HostResolver for FnResolver<F>
where
    F: Fn(&Parts) -> Result<TenantConfig, BoxError> + Send + Sync,
{
    async fn resolve(&self, head: &Parts) -> Result<TenantConfig, BoxError> {
        (self.f)(head)
    }
}
