//! Byte exchange with the upstream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, Version};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::BoxError;

/// Sends a fully shaped request upstream and returns the raw reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, req: Request<Body>) -> Result<Response<Body>, BoxError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, req: Request<Body>) -> Result<Response<Body>, BoxError> {
        (**self).round_trip(req).await
    }
}

/// Default transport: pooled hyper client speaking HTTP/1.1 to `http` and
/// `https` upstreams. HTTP/1.1 only, so protocol upgrades keep working.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(connect_timeout));

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, mut req: Request<Body>) -> Result<Response<Body>, BoxError> {
        *req.version_mut() = Version::HTTP_11;
        let response = self.client.request(req).await?;
        Ok(response.map(Body::new))
    }
}
