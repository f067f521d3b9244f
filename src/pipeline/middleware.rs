//! Middleware capability and the ordered runner.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BoxError, ProxyError};
use crate::tenant::TenantConfig;

/// A transformation over a decoded message body.
///
/// `H` is the message head the middleware may inspect. Returning an error
/// aborts the rest of the pipeline for this message.
pub trait Middleware<H>: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn transform(&self, head: &H, tenant: &TenantConfig, body: Bytes) -> Result<Bytes, BoxError>;
}

/// Closure-backed middleware. Created with [`from_fn`].
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named [`Middleware`].
pub fn from_fn<H, F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(&H, &TenantConfig, Bytes) -> Result<Bytes, BoxError> + Send + Sync,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}

impl<H, F> Middleware<H> for FnMiddleware<F>
where
    F: Fn(&H, &TenantConfig, Bytes) -> Result<Bytes, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, head: &H, tenant: &TenantConfig, body: Bytes) -> Result<Bytes, BoxError> {
        (self.f)(head, tenant, body)
    }
}

/// Ordered list of middlewares for one leg.
pub struct Pipeline<H> {
    stages: Vec<Arc<dyn Middleware<H>>>,
}

impl<H> Default for Pipeline<H> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<H> Clone for Pipeline<H> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<H> fmt::Debug for Pipeline<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|m| m.name()))
            .finish()
    }
}

impl<H> Pipeline<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; it runs after every stage already registered.
    pub fn push(&mut self, middleware: Arc<dyn Middleware<H>>) {
        self.stages.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn run(&self, head: &H, tenant: &TenantConfig, body: Bytes) -> Result<Bytes, ProxyError> {
        self.stages.iter().try_fold(body, |body, stage| {
            stage
                .transform(head, tenant, body)
                .map_err(|source| ProxyError::Middleware {
                    name: stage.name().to_string(),
                    source,
                })
        })
    }
}
