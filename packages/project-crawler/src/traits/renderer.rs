//! Renderer trait for fetching fully rendered project pages.
//!
//! A renderer turns a URL plus injected session state into the final DOM.
//! Implementations range from a plain HTTP client to a headless browser; the
//! orchestrator only sees this trait.
//!
//! # Usage
//!
//! ```rust,ignore
//! use project_crawler::{HttpRenderer, Renderer, SessionState};
//!
//! let renderer = HttpRenderer::new(&config)?;
//! let page = renderer.render("https://example.com/1001/museum", &session).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::RenderResult;
use crate::types::session::SessionState;

/// Rendered page content.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Requested URL
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    /// HTTP status of the final response
    pub status: u16,

    /// Final DOM as HTML
    pub html: String,

    /// When the render finished
    pub fetched_at: DateTime<Utc>,
}

impl RenderedPage {
    /// Create a rendered page with a 200 status.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            html: html.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Set the URL after redirects.
    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = url.into();
        self
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Check if this page has content.
    pub fn has_content(&self) -> bool {
        !self.html.trim().is_empty()
    }
}

/// Renderer trait for pluggable page rendering.
///
/// Implementations:
/// - `HttpRenderer` - reqwest with cookie injection and block-page detection
/// - `RateLimitedRenderer` - wraps any renderer with a request quota
/// - `MockRenderer` - canned pages for tests
///
/// Session state is stateful per renderer instance, so a renderer is driven by
/// exactly one task at a time.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url` with `session` injected and return the final DOM.
    ///
    /// Fails with `RenderError` on timeout, non-success status, transport
    /// failure or a detected challenge page.
    async fn render(&self, url: &str, session: &SessionState) -> RenderResult<RenderedPage>;

    /// Release whatever the renderer holds (browser, session). Called once
    /// when a run ends, however it ends.
    async fn close(&self) {}

    /// Get the renderer name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    async fn render(&self, url: &str, session: &SessionState) -> RenderResult<RenderedPage> {
        (**self).render(url, session).await
    }

    async fn close(&self) {
        (**self).close().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
