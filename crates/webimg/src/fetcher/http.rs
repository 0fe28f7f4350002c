use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;

use super::{ContentFetcher, FetchResponse};
use crate::error::FetchError;

const DEFAULT_USER_AGENT: &str = concat!("webimg/", env!("CARGO_PKG_VERSION"));

/// Create the reqwest client used by [`HttpFetcher::new`].
pub fn create_client(user_agent: &str) -> Result<Client, FetchError> {
    let provider = Arc::new(ring::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::Tls(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| FetchError::Tls(e.to_string()))?
        .with_no_client_auth();

    Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(user_agent)
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(FetchError::from)
}

/// Streams `http://` and `https://` sources.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_client(create_client(DEFAULT_USER_AGENT)?))
    }

    /// Use a preconfigured client (proxies, TLS, timeouts are the caller's
    /// business).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn open(&self, source: &str) -> Result<FetchResponse, FetchError> {
        let response = self.client.get(source).send().await?;
        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(FetchError::NotFound(format!("{source} ({status})")));
        }
        if !status.is_success() {
            return Err(FetchError::StatusCode(status));
        }

        let content_length = response.content_length();
        debug!(url = %source, ?content_length, "Opened HTTP source");

        let stream = response.bytes_stream().map_err(FetchError::from);
        Ok(FetchResponse::new(Box::pin(stream), content_length))
    }
}
