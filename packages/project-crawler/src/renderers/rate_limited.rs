//! Rate-limited renderer wrapper.
//!
//! Wraps any Renderer with a request quota using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::RenderResult;
use crate::traits::renderer::{RenderedPage, Renderer};
use crate::types::session::SessionState;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A renderer wrapper that enforces a request rate.
///
/// A rate of zero disables limiting.
pub struct RateLimitedRenderer<R: Renderer> {
    inner: R,
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl<R: Renderer> RateLimitedRenderer<R> {
    /// Create a new rate-limited renderer.
    ///
    /// # Arguments
    /// * `renderer` - The underlying renderer to wrap
    /// * `requests_per_second` - Maximum renders per second, 0 for unlimited
    pub fn new(renderer: R, requests_per_second: u32) -> Self {
        Self {
            inner: renderer,
            limiter: NonZeroU32::new(requests_per_second)
                .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps)))),
        }
    }

    /// Create with a custom quota.
    pub fn with_quota(renderer: R, quota: Quota) -> Self {
        Self {
            inner: renderer,
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
        }
    }

    /// Get the wrapped renderer.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl<R: Renderer> Renderer for RateLimitedRenderer<R> {
    async fn render(&self, url: &str, session: &SessionState) -> RenderResult<RenderedPage> {
        self.wait_for_permit().await;
        self.inner.render(url, session).await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Extension trait for easy rate limiting.
pub trait RendererExt: Renderer + Sized {
    /// Wrap this renderer with rate limiting.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedRenderer<Self> {
        RateLimitedRenderer::new(self, requests_per_second)
    }
}

impl<R: Renderer + Sized> RendererExt for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRenderer;
    use std::time::Instant;

    #[tokio::test]
    async fn test_rate_limiting() {
        let mock = MockRenderer::new()
            .with_page("https://example.com/1", "<h1>1</h1>")
            .with_page("https://example.com/2", "<h1>2</h1>")
            .with_page("https://example.com/3", "<h1>3</h1>");

        // 2 requests per second
        let renderer = mock.rate_limited(2);
        let session = SessionState::new();

        let start = Instant::now();
        for url in ["https://example.com/1", "https://example.com/2", "https://example.com/3"] {
            renderer.render(url, &session).await.unwrap();
        }
        let elapsed = start.elapsed();

        // First is immediate, 2nd and 3rd wait
        assert!(elapsed.as_millis() >= 500, "Rate limiting not working: {:?}", elapsed);
        assert_eq!(renderer.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_rate_is_unlimited() {
        let renderer = MockRenderer::new()
            .with_page("https://example.com/1", "<h1>1</h1>")
            .rate_limited(0);
        let session = SessionState::new();

        let start = Instant::now();
        for _ in 0..5 {
            renderer.render("https://example.com/1", &session).await.unwrap();
        }
        assert!(start.elapsed().as_millis() < 500);
    }

    #[tokio::test]
    async fn test_close_forwarded() {
        let mock = MockRenderer::new();
        let renderer = mock.clone().rate_limited(1);
        renderer.close().await;
        assert!(mock.is_closed());
    }
}
