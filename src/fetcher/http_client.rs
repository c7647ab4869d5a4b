use crate::config::FetcherConfig;
use rand::RngExt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("invalid url {url}: {source}")]
    BadUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request failed for {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("http status {status} for {url}")]
    Status { url: String, status: u16 },
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: FetcherConfig,
}

impl HttpClient {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.timeout_ms))
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { inner, config: config.clone() })
    }

    /// Fetch a URL as text.
    ///
    /// With `max_retries = 0` (the default) this is a single attempt per
    /// call; the scheduler re-attempts every period anyway. A non-zero
    /// setting retries on exponential backoff with jitter.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let url = Url::parse(url)
            .map_err(|source| FetchError::BadUrl { url: url.to_string(), source })?;

        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(self.config.retry_base_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries as usize);

        Retry::spawn(strategy, || self.try_get(&url)).await
    }

    async fn try_get(&self, url: &Url) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = match self.inner.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Request failed for {}: {}", url, e);
                return Err(FetchError::Request { url: url.to_string(), reason: e.to_string() });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("HTTP {} for {}", status, url);
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        resp.text().await.map_err(|e| {
            warn!("Failed to read body from {}: {}", url, e);
            FetchError::Request { url: url.to_string(), reason: e.to_string() }
        })
    }

    /// Sleep for the configured delay + random jitter before hitting the
    /// upstream host.
    async fn polite_delay(&self) {
        if self.config.request_delay_ms == 0 && self.config.jitter_ms == 0 {
            return;
        }
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        sleep(Duration::from_millis(self.config.request_delay_ms + jitter_ms)).await;
    }
}
