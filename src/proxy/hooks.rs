//! Error hooks supplied by the embedder.

use std::sync::Arc;

use axum::http::{request, response};

use crate::error::ProxyError;

/// Observes (and on the response leg, may recover) pipeline failures.
pub trait ErrorHooks: Send + Sync {
    /// Notification only: the request has already been stopped and will not
    /// reach the upstream.
    fn on_request_error(&self, head: &request::Parts, err: &ProxyError) {
        let _ = (head, err);
    }

    /// Return `None` to let a best-effort response through, or an error to
    /// fail the exchange.
    fn on_response_error(&self, head: &response::Parts, err: ProxyError) -> Option<ProxyError> {
        let _ = head;
        Some(err)
    }
}

/// No-op request hook, pass-through response hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ErrorHooks for DefaultHooks {}

impl<T: ErrorHooks + ?Sized> ErrorHooks for Arc<T> {
    fn on_request_error(&self, head: &request::Parts, err: &ProxyError) {
        (**self).on_request_error(head, err)
    }

    fn on_response_error(&self, head: &response::Parts, err: ProxyError) -> Option<ProxyError> {
        (**self).on_response_error(head, err)
    }
}
