//! Configuration types for crawl runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Render, extract and download gallery images
    #[default]
    Full,
    /// Render and extract only
    TextOnly,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::TextOnly => "text-only",
        }
    }

    /// Whether gallery images are downloaded in this mode.
    pub fn downloads_images(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown run mode: {0:?} (expected \"full\" or \"text-only\")")]
pub struct UnknownMode(pub String);

impl FromStr for RunMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "text-only" | "text_only" | "text" => Ok(Self::TextOnly),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Configuration for a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Task list file (checkpoint store)
    pub task_list: PathBuf,

    /// Root of the per-task output directories
    pub output_dir: PathBuf,

    /// Optional session bundle injected into every render
    pub session_file: Option<PathBuf>,

    /// Stages to run. Default: full.
    pub mode: RunMode,

    /// Single-task dry run that never mutates the task list.
    pub debug: bool,

    /// Upper bound on a single page render. Default: 60s.
    pub render_timeout_secs: u64,

    /// Upper bound on a single image fetch. Default: 30s.
    pub download_timeout_secs: u64,

    /// Image fetches in flight per task. Default: 4.
    pub max_concurrent_downloads: usize,

    /// Attempts per image before giving up. Default: 3.
    pub max_download_attempts: u32,

    /// Base pause between image attempts, multiplied by the attempt number.
    /// Default: 500ms.
    pub retry_backoff_ms: u64,

    /// Page renders per second (0 disables limiting). Default: 1.
    pub requests_per_second: u32,

    /// Pause between tasks. Default: 1000ms.
    pub task_delay_ms: u64,

    /// User agent presented to the site
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            task_list: PathBuf::from("projects.csv"),
            output_dir: PathBuf::from("data"),
            session_file: None,
            mode: RunMode::Full,
            debug: false,
            render_timeout_secs: 60,
            download_timeout_secs: 30,
            max_concurrent_downloads: 4,
            max_download_attempts: 3,
            retry_backoff_ms: 500,
            requests_per_second: 1,
            task_delay_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl CrawlConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task list path.
    pub fn with_task_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.task_list = path.into();
        self
    }

    /// Set the output root.
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Set the session bundle path.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Set the run mode.
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the single-task dry run.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the pause between tasks.
    pub fn with_task_delay(mut self, delay: Duration) -> Self {
        self.task_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the pause between image attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set image attempts per descriptor.
    pub fn with_max_download_attempts(mut self, attempts: u32) -> Self {
        self.max_download_attempts = attempts;
        self
    }

    /// Set concurrent image fetches per task.
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    /// Set the render timeout.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("full".parse::<RunMode>().unwrap(), RunMode::Full);
        assert_eq!("Text-Only".parse::<RunMode>().unwrap(), RunMode::TextOnly);
        assert_eq!("text_only".parse::<RunMode>().unwrap(), RunMode::TextOnly);
        assert!("images".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CrawlConfig::new()
            .with_task_list("tasks.csv")
            .with_output_dir("out")
            .with_mode(RunMode::TextOnly)
            .with_debug(true)
            .with_task_delay(Duration::ZERO)
            .with_retry_backoff(Duration::from_millis(10));

        assert_eq!(config.task_list, PathBuf::from("tasks.csv"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.mode, RunMode::TextOnly);
        assert!(config.debug);
        assert_eq!(config.task_delay(), Duration::ZERO);
        assert_eq!(config.retry_backoff(), Duration::from_millis(10));
        assert!(!config.mode.downloads_images());
    }
}
