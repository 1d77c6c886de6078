use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, trace};
use url::Url;

use crate::config::FetcherConfig;
use crate::errors::{AppResult, FetchError, FetchResult};
use crate::utils::url::UrlUtils;

/// Status and body of a completed GET; the only response fields the fetcher consults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam used by the favicon fetcher
///
/// Transport failures and timeouts come back as `Err`; any response that
/// arrived, whatever its status, comes back as `Ok`.
#[async_trait]
pub trait FaviconHttpClient: Send + Sync {
    /// Issue a plain GET
    async fn get(&self, url: &Url) -> FetchResult<HttpResponse>;
}

/// reqwest-backed client with a per-request timeout and a cap on concurrent requests
pub struct StandardHttpClient {
    client: Client,
    permits: Arc<Semaphore>,
}

impl StandardHttpClient {
    /// Create a client from fetcher configuration
    pub fn new(config: &FetcherConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .user_agent(config.effective_user_agent())
            .build()?;

        debug!(
            "Created favicon HTTP client (max_connections={}, timeout={:?})",
            config.max_connections, config.request_timeout
        );

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Requests that could start right now without waiting for a slot
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn map_error(url: &Url, error: reqwest::Error) -> FetchError {
        let safe_url = UrlUtils::obfuscate_credentials(url.as_str());
        if error.is_timeout() {
            FetchError::Timeout { url: safe_url }
        } else {
            let message = UrlUtils::obfuscate_credentials(&error.to_string());
            FetchError::transport(safe_url, message)
        }
    }
}

#[async_trait]
impl FaviconHttpClient for StandardHttpClient {
    async fn get(&self, url: &Url) -> FetchResult<HttpResponse> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            FetchError::transport(
                UrlUtils::obfuscate_credentials(url.as_str()),
                "connection limiter closed",
            )
        })?;

        trace!("GET {}", UrlUtils::obfuscate_credentials(url.as_str()));

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(HttpResponse::new(status.as_u16(), Bytes::new()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        debug!(
            "Fetched {} bytes from {}",
            body.len(),
            UrlUtils::obfuscate_credentials(url.as_str())
        );
        Ok(HttpResponse::new(status.as_u16(), body))
    }
}
