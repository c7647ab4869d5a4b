pub mod http_client;

pub use http_client::{FetchError, HttpClient};

use crate::config::FetcherConfig;
use crate::feeds::Feed;
use async_trait::async_trait;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable feed source abstraction. The pipeline only ever sees raw text
/// or a typed failure; tests substitute scripted sources.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_raw(&self, feed: &Feed) -> Result<String, FetchError>;
}

// ── HTTP fetcher ──────────────────────────────────────────────────────────────

pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        Ok(Self { client: HttpClient::new(config)? })
    }
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch_raw(&self, feed: &Feed) -> Result<String, FetchError> {
        self.client.get_text(&feed.url).await
    }
}
