//! Renderer implementations.

pub mod http;
pub mod rate_limited;

pub use http::HttpRenderer;
pub use rate_limited::{RateLimitedRenderer, RendererExt};
