//! HTTP asset fetcher.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::{AssetError, AssetResult};
use crate::traits::fetcher::{AssetFetcher, FetchedAsset};
use crate::types::config::CrawlConfig;

/// Fetches image bytes with a plain reqwest client. No session state.
#[derive(Clone)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpAssetFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.download_timeout())
            .build()?;
        Ok(Self {
            client,
            timeout_secs: config.download_timeout_secs,
        })
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn map_error(&self, error: reqwest::Error) -> AssetError {
        if error.is_timeout() {
            AssetError::Timeout {
                seconds: self.timeout_secs,
            }
        } else {
            AssetError::Http(Box::new(error))
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> AssetResult<FetchedAsset> {
        debug!(url = %url, "Fetching asset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = response.url().to_string();
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;

        let mut asset = FetchedAsset::new(final_url, bytes.to_vec());
        if let Some(ct) = content_type {
            asset = asset.with_content_type(ct);
        }
        Ok(asset)
    }
}
