//! Recording doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{request, response, HeaderMap, Method, Request, Response, Uri};
use bytes::Bytes;

use crate::error::{BoxError, ProxyError};
use crate::proxy::{ErrorHooks, Transport};
use crate::tenant::{HostResolver, TenantConfig};

/// Resolver that counts invocations.
pub(crate) struct CountingResolver {
    result: Result<TenantConfig, String>,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub(crate) fn new(tenant: TenantConfig) -> Self {
        Self {
            result: Ok(tenant),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for CountingResolver {
    async fn resolve(&self, _head: &request::Parts) -> Result<TenantConfig, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(Into::into)
    }
}

/// What the mock upstream received.
#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport answering every request with a canned response.
pub(crate) struct MockTransport {
    respond: Box<dyn Fn() -> Response<Body> + Send + Sync>,
    captured: Mutex<Vec<Captured>>,
}

impl MockTransport {
    pub(crate) fn new(respond: impl Fn() -> Response<Body> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            captured: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(body: &'static str) -> Self {
        Self::new(move || Response::new(Body::from(body)))
    }

    pub(crate) fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.captured.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn round_trip(&self, req: Request<Body>) -> Result<Response<Body>, BoxError> {
        let (head, body) = req.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await?;
        self.captured.lock().unwrap().push(Captured {
            method: head.method,
            uri: head.uri,
            headers: head.headers,
            body,
        });
        Ok((self.respond)())
    }
}

/// Hooks that record every error they see.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    pub recover: bool,
    request_errors: Mutex<Vec<String>>,
    response_errors: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub(crate) fn recovering() -> Self {
        Self {
            recover: true,
            ..Self::default()
        }
    }

    pub(crate) fn request_errors(&self) -> Vec<String> {
        self.request_errors.lock().unwrap().clone()
    }

    pub(crate) fn response_errors(&self) -> Vec<String> {
        self.response_errors.lock().unwrap().clone()
    }
}

impl ErrorHooks for RecordingHooks {
    fn on_request_error(&self, _head: &request::Parts, err: &ProxyError) {
        self.request_errors.lock().unwrap().push(err.to_string());
    }

    fn on_response_error(&self, _head: &response::Parts, err: ProxyError) -> Option<ProxyError> {
        self.response_errors.lock().unwrap().push(err.to_string());
        if self.recover {
            None
        } else {
            Some(err)
        }
    }
}
