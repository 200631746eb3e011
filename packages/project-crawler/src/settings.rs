//! Run configuration from `CRAWLER_*` environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use project_crawler::{CrawlConfig, RunMode};

/// Build the config from the process environment (after `.env` is loaded).
pub fn from_env() -> Result<CrawlConfig> {
    from_lookup(|key| env::var(key).ok())
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value: {value:?}")),
        None => Ok(None),
    }
}

pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<CrawlConfig> {
    let mut config = CrawlConfig::default();

    if let Some(path) = lookup("CRAWLER_TASK_LIST") {
        config = config.with_task_list(path);
    }
    if let Some(path) = lookup("CRAWLER_OUTPUT_DIR") {
        config = config.with_output_dir(path);
    }
    if let Some(path) = lookup("CRAWLER_SESSION_FILE").filter(|p| !p.trim().is_empty()) {
        config = config.with_session_file(path);
    }
    if let Some(mode) = parse::<RunMode>(&lookup, "CRAWLER_MODE")? {
        config = config.with_mode(mode);
    }
    if let Some(secs) = parse::<u64>(&lookup, "CRAWLER_RENDER_TIMEOUT_SECS")? {
        config = config.with_render_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = parse(&lookup, "CRAWLER_DOWNLOAD_TIMEOUT_SECS")? {
        config.download_timeout_secs = secs;
    }
    if let Some(max) = parse(&lookup, "CRAWLER_MAX_CONCURRENT_DOWNLOADS")? {
        config = config.with_max_concurrent_downloads(max);
    }
    if let Some(attempts) = parse(&lookup, "CRAWLER_MAX_DOWNLOAD_ATTEMPTS")? {
        config = config.with_max_download_attempts(attempts);
    }
    if let Some(ms) = parse::<u64>(&lookup, "CRAWLER_RETRY_BACKOFF_MS")? {
        config = config.with_retry_backoff(Duration::from_millis(ms));
    }
    if let Some(rps) = parse(&lookup, "CRAWLER_REQUESTS_PER_SECOND")? {
        config.requests_per_second = rps;
    }
    if let Some(ms) = parse::<u64>(&lookup, "CRAWLER_TASK_DELAY_MS")? {
        config = config.with_task_delay(Duration::from_millis(ms));
    }
    if let Some(agent) = lookup("CRAWLER_USER_AGENT").filter(|a| !a.trim().is_empty()) {
        config.user_agent = agent;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.task_list, PathBuf::from("projects.csv"));
        assert_eq!(config.mode, RunMode::Full);
    }

    #[test]
    fn test_env_overrides() {
        let config = from_lookup(lookup(&[
            ("CRAWLER_TASK_LIST", "tasks.csv"),
            ("CRAWLER_MODE", "text-only"),
            ("CRAWLER_MAX_CONCURRENT_DOWNLOADS", "8"),
            ("CRAWLER_TASK_DELAY_MS", "0"),
            ("CRAWLER_SESSION_FILE", ""),
        ]))
        .unwrap();

        assert_eq!(config.task_list, PathBuf::from("tasks.csv"));
        assert_eq!(config.mode, RunMode::TextOnly);
        assert_eq!(config.max_concurrent_downloads, 8);
        assert_eq!(config.task_delay(), Duration::ZERO);
        assert!(config.session_file.is_none());
    }

    #[test]
    fn test_invalid_value_names_the_variable() {
        let err = from_lookup(lookup(&[("CRAWLER_MAX_DOWNLOAD_ATTEMPTS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CRAWLER_MAX_DOWNLOAD_ATTEMPTS"));
    }
}
