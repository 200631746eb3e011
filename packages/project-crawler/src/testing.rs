//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the orchestrator and downloader without
//! network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{AssetError, AssetResult, RenderError, RenderResult};
use crate::traits::fetcher::{AssetFetcher, FetchedAsset};
use crate::traits::renderer::{RenderedPage, Renderer};
use crate::types::session::SessionState;

/// Smallest byte sequence the downloader accepts as a JPEG.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Failure a mock should produce for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Blocked,
    Status(u16),
    Transport,
}

impl MockFailure {
    fn render_error(self, url: &str) -> RenderError {
        let url = url.to_string();
        match self {
            Self::Timeout => RenderError::Timeout { url, seconds: 60 },
            Self::Blocked => RenderError::Blocked {
                url,
                reason: "challenge page (captcha)".to_string(),
            },
            Self::Status(status) => RenderError::Status { url, status },
            Self::Transport => RenderError::Transport {
                url,
                source: "connection reset".into(),
            },
        }
    }

    fn asset_error(self, url: &str) -> AssetError {
        match self {
            Self::Timeout => AssetError::Timeout { seconds: 30 },
            Self::Blocked => AssetError::Status {
                url: url.to_string(),
                status: 403,
            },
            Self::Status(status) => AssetError::Status {
                url: url.to_string(),
                status,
            },
            Self::Transport => AssetError::Http("connection reset".into()),
        }
    }
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// A mock renderer serving canned pages.
///
/// Unknown URLs answer HTTP 404. Clones share state, so a test can keep a
/// handle for assertions after moving the renderer into an orchestrator.
#[derive(Clone, Default)]
pub struct MockRenderer {
    pages: Arc<RwLock<HashMap<String, String>>>,
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.set_page(url, html);
        self
    }

    /// Fail every render of `url`.
    pub fn with_failure(self, url: impl Into<String>, failure: MockFailure) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), failure);
        self
    }

    /// Sleep before answering each render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the page for `url`, clearing any failure, on a shared handle.
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        let url = url.into();
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&url);
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, html.into());
    }

    /// URLs rendered so far, in order.
    pub fn calls(&self) -> Vec<String> {
        read(&self.calls)
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, url: &str, _session: &SessionState) -> RenderResult<RenderedPage> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied();
        if let Some(failure) = failure {
            return Err(failure.render_error(url));
        }

        let html = self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();
        html.map(|html| RenderedPage::new(url, html))
            .ok_or_else(|| RenderError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Clone)]
struct MockAsset {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// A mock asset fetcher serving canned bytes.
///
/// Unknown URLs answer HTTP 404.
#[derive(Clone, Default)]
pub struct MockAssetFetcher {
    assets: Arc<RwLock<HashMap<String, MockAsset>>>,
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    transient: Arc<RwLock<HashMap<String, usize>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a small JPEG for `url`.
    pub fn with_image(self, url: impl Into<String>) -> Self {
        self.with_asset(url, "image/jpeg", JPEG_BYTES.to_vec())
    }

    /// Serve arbitrary bytes for `url`.
    pub fn with_asset(
        self,
        url: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                url.into(),
                MockAsset {
                    content_type: Some(content_type.into()),
                    bytes: bytes.into(),
                },
            );
        self
    }

    /// Fail every fetch of `url`.
    pub fn with_failure(self, url: impl Into<String>, failure: MockFailure) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), failure);
        self
    }

    /// Answer HTTP 503 for the first `count` fetches of `url`.
    pub fn with_transient_failures(self, url: impl Into<String>, count: usize) -> Self {
        self.transient
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), count);
        self
    }

    /// Stop failing `url`.
    pub fn clear_failure(&self, url: &str) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        read(&self.calls)
    }

    /// Number of fetches of `url`.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl AssetFetcher for MockAssetFetcher {
    async fn fetch(&self, url: &str) -> AssetResult<FetchedAsset> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        {
            let mut transient = self.transient.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(remaining) = transient.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AssetError::Status {
                        url: url.to_string(),
                        status: 503,
                    });
                }
            }
        }

        let failure = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied();
        if let Some(failure) = failure {
            return Err(failure.asset_error(url));
        }

        let asset = self
            .assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();
        match asset {
            Some(asset) => {
                let mut fetched = FetchedAsset::new(url, asset.bytes);
                if let Some(ct) = asset.content_type {
                    fetched = fetched.with_content_type(ct);
                }
                Ok(fetched)
            }
            None => Err(AssetError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn slug(title: &str) -> String {
    title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// URL of the `n`th (1-based) gallery image in [`sample_project_html`].
pub fn sample_image_url(title: &str, n: usize) -> String {
    format!("https://cdn.example.com/{}/{:02}.jpg", slug(title), n)
}

/// A project page in the site's markup with `images` gallery thumbnails
/// linking straight to [`sample_image_url`]s.
pub fn sample_project_html(title: &str, images: usize) -> String {
    let thumbs: String = (1..=images)
        .map(|n| {
            format!(
                r#"<li class="gallery-thumbs-item"><a class="gallery-thumbs-link" href="{}" title="{} photo {n}"><img alt="thumb"></a></li>"#,
                sample_image_url(title, n),
                title
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title} / Studio Alpha | Example</title></head>
<body>
  <h1 class="afd-title-big afd-title-big--bmargin-big">{title} / Studio Alpha</h1>
  <div class="afd-specs__header-category"><a href="/c/museum">Museum</a> <a href="/c/planetarium">Planetarium</a></div>
  <div class="afd-specs__header-location">Lyon, <a href="/country/france">France</a></div>
  <ul>
    <li class="afd-specs__item"><span class="afd-specs__key">Architects:</span>
      <span class="afd-specs__value"><a href="/o/a">Studio Alpha</a>, <a href="/o/b">Studio Beta</a></span></li>
    <li class="afd-specs__item"><span class="afd-specs__key">Area</span>
      <span class="afd-specs__value">1200 m²</span></li>
    <li class="afd-specs__item"><span class="afd-specs__key">Year</span>
      <span class="afd-specs__value">2021</span></li>
  </ul>
  <ul class="gallery-thumbs">{thumbs}</ul>
  <div class="the-content">
    <p>The museum sits on a terrace above the river, facing the old town.</p>
    <p>Save this picture!</p>
    <p>Courtesy of Studio</p>
    <p>{title} opens its galleries to the public square through a glazed ground floor.</p>
  </div>
</body>
</html>"#
    )
}
