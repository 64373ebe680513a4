//! Fetching resource bytes.
//!
//! The pipeline's one I/O seam: resolution units pull remote content
//! through a [`Fetcher`]; `file:` URIs are read directly and never go
//! through one. Tests swap in deterministic implementations to drive
//! ordering and failure scenarios.

use async_trait::async_trait;
use url::Url;

use crate::error::ResolveError;

/// Source of resource bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the complete byte content behind `uri`.
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, ResolveError>;
}

/// HTTP(S) fetcher on a shared reqwest client.
#[derive(Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, ResolveError> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
