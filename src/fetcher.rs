//! HTTP fetching of download targets
//!
//! The row processor talks to the network through the [`Fetcher`] trait so the
//! batch logic can be exercised without a live server. [`HttpFetcher`] is the
//! production implementation backed by a shared `reqwest::Client`.

use crate::config::SourceConfig;
use crate::error::{FetchError, Result};
use async_trait::async_trait;
use url::Url;

/// Fetches the full body of a URL
///
/// A fetch either yields the complete body or a [`FetchError`]. Non-success
/// HTTP statuses must map to [`FetchError::NotFound`]; anything that prevents
/// a response from being read maps to [`FetchError::Transport`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a single GET and return the response body
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] backed by `reqwest`
///
/// No timeout or retry is configured beyond the client defaults; a request
/// runs until it completes or the transport fails.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the configured User-Agent
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(source.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| {
            let message = if e.is_connect() {
                format!("connection failed: {e}")
            } else if e.is_timeout() {
                format!("timed out: {e}")
            } else {
                e.to_string()
            };
            FetchError::Transport {
                url: url.to_string(),
                message,
            }
        };

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}
