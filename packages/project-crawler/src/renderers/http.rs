//! HTTP renderer.
//!
//! Fetches the server-rendered DOM with reqwest, injecting the session's
//! cookies and headers. Challenge pages served with a 200 are detected by
//! marker text and reported as blocks.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::{RenderedPage, Renderer};
use crate::types::config::CrawlConfig;
use crate::types::session::SessionState;

/// Lowercase markers that only appear on anti-bot interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-challenge",
    "challenge-platform",
    "cf-browser-verification",
    "_cf_chl_opt",
];

/// Lowercase page titles of anti-bot interstitials, matched exactly.
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment...",
    "attention required! | cloudflare",
    "access denied",
    "are you a robot?",
];

/// Only the head of the document is scanned for markers.
const CHALLENGE_SCAN_BYTES: usize = 16 * 1024;

/// Renderer backed by a plain HTTP client.
///
/// # Example
///
/// ```rust,ignore
/// use project_crawler::{CrawlConfig, HttpRenderer, Renderer, RendererExt};
///
/// let renderer = HttpRenderer::new(&CrawlConfig::default())?.rate_limited(1);
/// ```
pub struct HttpRenderer {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRenderer {
    /// Build a renderer from run configuration.
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.render_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            timeout: config.render_timeout(),
        })
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn session_headers(session: &SessionState) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session.cookie_header() {
            match HeaderValue::from_str(&cookie) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(COOKIE, value);
                }
                Err(_) => warn!("Session cookies contain invalid header characters, skipping"),
            }
        }
        for (name, value) in session.headers() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(mut value)) => {
                    value.set_sensitive(true);
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Invalid session header, skipping"),
            }
        }
        headers
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, session: &SessionState) -> RenderResult<RenderedPage> {
        let parsed = Url::parse(url).map_err(|_| RenderError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RenderError::InvalidUrl {
                url: url.to_string(),
            });
        }

        debug!(url = %url, "HTTP render starting");
        let response = self
            .client
            .get(parsed)
            .headers(Self::session_headers(session))
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if let Some(reason) = blocked_status(status.as_u16()) {
            return Err(RenderError::Blocked {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RenderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if let Some(marker) = detect_challenge(&html) {
            return Err(RenderError::Blocked {
                url: url.to_string(),
                reason: format!("challenge page ({marker})"),
            });
        }

        Ok(RenderedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            html,
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl HttpRenderer {
    fn transport_error(&self, url: &str, error: reqwest::Error) -> RenderError {
        if error.is_timeout() {
            RenderError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            warn!(url = %url, error = %error, "HTTP render failed");
            RenderError::Transport {
                url: url.to_string(),
                source: Box::new(error),
            }
        }
    }
}

/// Statuses that mean the site refused us rather than failed.
fn blocked_status(status: u16) -> Option<&'static str> {
    match status {
        403 => Some("HTTP 403 forbidden"),
        429 => Some("HTTP 429 rate limited"),
        _ => None,
    }
}

/// Return the challenge marker or title found in the head of `html`.
///
/// Ordinary pages that merely embed a captcha widget are not challenges.
pub fn detect_challenge(html: &str) -> Option<&'static str> {
    let mut end = html.len().min(CHALLENGE_SCAN_BYTES);
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    let head = html[..end].to_lowercase();

    if let Some(marker) = CHALLENGE_MARKERS
        .iter()
        .copied()
        .find(|marker| head.contains(marker))
    {
        return Some(marker);
    }

    let title = page_title(&head)?;
    CHALLENGE_TITLES.iter().copied().find(|t| *t == title)
}

/// Whitespace-collapsed `<title>` text of an already lowercased document.
fn page_title(html: &str) -> Option<String> {
    let open = html.find("<title")?;
    let start = open + html[open..].find('>')? + 1;
    let end = start + html[start..].find("</title")?;
    Some(html[start..end].split_whitespace().collect::<Vec<_>>().join(" "))
}
