//! HTTP transport over a pooled hyper client with rustls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderValue;
use http::header::USER_AGENT;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tenant_dispatch_sdk::{DispatchResponse, PreparedRequest, Transport, TransportError};
use tracing::debug;

use crate::config::TransportConfig;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`Transport`] backed by hyper.
///
/// Each attempt is bounded by the configured timeout, which covers
/// connecting, sending, and collecting the response body.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    timeout: Duration,
    user_agent: HeaderValue,
}

impl HyperTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Tls`] if the TLS connector cannot be built,
    /// or [`TransportError::Build`] if the user agent is not a valid header value.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| TransportError::Build(e.into()))?;

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| TransportError::Tls(Box::new(e)))?;
        let connector = if config.allow_insecure_http {
            builder.https_or_http().enable_all_versions().build()
        } else {
            builder.https_only().enable_all_versions().build()
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Ok(Self {
            client,
            timeout: config.request_timeout,
            user_agent,
        })
    }

    async fn execute(
        &self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<DispatchResponse, TransportError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Connection(Box::new(e)))?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Body(Box::new(e)))?
            .to_bytes();
        Ok(DispatchResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    #[tracing::instrument(
        skip_all,
        fields(method = %request.method, host = request.url.host_str(), path = request.url.path())
    )]
    async fn send(&self, request: PreparedRequest) -> Result<DispatchResponse, TransportError> {
        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, self.user_agent.clone());
            }
        }
        let wire = builder.body(Full::new(request.body))?;

        let response = tokio::time::timeout(self.timeout, self.execute(wire))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        debug!(status = %response.status, bytes = response.body.len(), "Received response");
        Ok(response)
    }
}

/// Globally installed rustls provider, or aws-lc-rs when none is installed.
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}
