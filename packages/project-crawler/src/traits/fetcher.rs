//! Asset fetcher trait for stateless image downloads.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AssetResult;

/// Raw bytes of a fetched asset.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedAsset {
    pub fn new(url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Whether the payload is an image, by declared type or magic bytes.
    pub fn is_image(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.trim().to_ascii_lowercase().starts_with("image/") {
                return true;
            }
        }
        sniff_image(&self.bytes)
    }

    /// Whether the payload is an HTML page.
    pub fn is_html(&self) -> bool {
        if let Some(ct) = &self.content_type {
            let ct = ct.to_ascii_lowercase();
            if ct.contains("text/html") || ct.contains("application/xhtml") {
                return true;
            }
        }
        let head = &self.bytes[..self.bytes.len().min(512)];
        let head = String::from_utf8_lossy(head).to_ascii_lowercase();
        let head = head.trim_start();
        head.starts_with("<!doctype html") || head.starts_with("<html")
    }

    pub fn content_type_label(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn sniff_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}

/// Fetches asset bytes. Assets need no session state, so fetchers may be
/// driven concurrently.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AssetResult<FetchedAsset>;
}

#[async_trait]
impl<F: AssetFetcher + ?Sized> AssetFetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> AssetResult<FetchedAsset> {
        (**self).fetch(url).await
    }
}
