//! Crawl orchestrator.
//!
//! Drives every actionable task through render, extract, download and
//! persist, committing each task's record to the checkpoint store right
//! after its attempt. A task failure is recorded and the batch continues;
//! a store failure ends the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use project_crawler::{CrawlOrchestrator, CsvCheckpointStore, HttpAssetFetcher, HttpRenderer};
//!
//! let orchestrator = CrawlOrchestrator::new(renderer, store, fetcher, session, config)
//!     .with_cancellation(token.clone());
//! let summary = orchestrator.run().await?;
//! ```

use chrono::Utc;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assets::{AssetDownloader, DownloaderConfig};
use crate::error::{CrawlError, RenderError, Result};
use crate::extract::{extract_manifest, extract_project};
use crate::output::OutputLayout;
use crate::stores::DryRunStore;
use crate::traits::fetcher::AssetFetcher;
use crate::traits::renderer::Renderer;
use crate::traits::store::CheckpointStore;
use crate::types::config::{CrawlConfig, RunMode};
use crate::types::session::SessionState;
use crate::types::task::{TaskRecord, TaskStatus};

/// Where a task is in its attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    Fetching,
    Extracting,
    Downloading,
    Persisted,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Downloading => "downloading",
            Self::Persisted => "persisted",
        })
    }
}

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Actionable tasks found at start
    pub selected: usize,
    /// Tasks attempted and committed
    pub processed: usize,
    pub downloaded: usize,
    pub incomplete: usize,
    pub errored: usize,
    /// The run stopped early on cancellation
    pub cancelled: bool,
}

impl RunSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            selected: 0,
            processed: 0,
            downloaded: 0,
            incomplete: 0,
            errored: 0,
            cancelled: false,
        }
    }

    fn record(&mut self, status: TaskStatus) {
        self.processed += 1;
        match status {
            TaskStatus::Downloaded => self.downloaded += 1,
            TaskStatus::Incomplete => self.incomplete += 1,
            TaskStatus::Error => self.errored += 1,
            TaskStatus::Pending | TaskStatus::Excluded => {}
        }
    }

    /// Tasks left untouched by this run.
    pub fn remaining(&self) -> usize {
        self.selected.saturating_sub(self.processed)
    }
}

/// Runs a batch of tasks against a renderer, a store and an asset fetcher.
pub struct CrawlOrchestrator<R, S, F>
where
    R: Renderer,
    S: CheckpointStore,
    F: AssetFetcher,
{
    renderer: R,
    store: S,
    downloader: AssetDownloader<F>,
    session: SessionState,
    layout: OutputLayout,
    config: CrawlConfig,
    cancel: CancellationToken,
}

impl<R, S, F> CrawlOrchestrator<R, S, F>
where
    R: Renderer,
    S: CheckpointStore,
    F: AssetFetcher,
{
    pub fn new(renderer: R, store: S, fetcher: F, session: SessionState, config: CrawlConfig) -> Self {
        Self {
            renderer,
            store,
            downloader: AssetDownloader::new(fetcher, DownloaderConfig::from(&config)),
            session,
            layout: OutputLayout::new(&config.output_dir),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run every actionable task once.
    ///
    /// The renderer is closed when the run ends, however it ends. In debug
    /// mode only the first actionable task runs and nothing is committed to
    /// the real store.
    pub async fn run(self) -> Result<RunSummary> {
        let result = if self.config.debug {
            let sink = DryRunStore::new(&self.store);
            self.run_batch(&sink).await
        } else {
            self.run_batch(&self.store).await
        };

        self.renderer.close().await;
        match &result {
            Ok(summary) => info!(
                mode = %summary.mode,
                selected = summary.selected,
                processed = summary.processed,
                downloaded = summary.downloaded,
                incomplete = summary.incomplete,
                errored = summary.errored,
                cancelled = summary.cancelled,
                "Crawl run finished"
            ),
            Err(e) => warn!(error = %e, "Crawl run aborted"),
        }
        result
    }

    async fn run_batch<C: CheckpointStore>(&self, store: &C) -> Result<RunSummary> {
        let mode = self.config.mode;
        let mut summary = RunSummary::new(mode);

        tokio::fs::create_dir_all(self.layout.root())
            .await
            .map_err(|source| CrawlError::Output {
                path: self.layout.root().display().to_string(),
                source,
            })?;

        let mut tasks = store.select_actionable(mode).await?;
        if self.config.debug {
            tasks.truncate(1);
        }
        summary.selected = tasks.len();
        info!(
            mode = %mode,
            store = store.name(),
            renderer = self.renderer.name(),
            tasks = tasks.len(),
            debug = self.config.debug,
            "Starting crawl run"
        );

        let total = tasks.len();
        for (i, task) in tasks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if i > 0 && !self.pause_between_tasks().await {
                summary.cancelled = true;
                break;
            }

            info!(task_id = %task.id, url = %task.url, progress = %format!("{}/{}", i + 1, total), "Processing task");
            let task_id = task.id.clone();
            let updated = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(task_id = %task_id, "Cancelled mid-task, leaving record untouched");
                    summary.cancelled = true;
                    break;
                }
                updated = self.process_task(task) => updated,
            };

            store.commit(&updated).await?;
            summary.record(updated.status);
            info!(
                task_id = %updated.id,
                status = %updated.status,
                error_detail = updated.error_detail.as_deref().unwrap_or(""),
                "Task committed"
            );
        }

        Ok(summary)
    }

    /// Wait `task_delay`; false if cancelled while waiting.
    async fn pause_between_tasks(&self) -> bool {
        let delay = self.config.task_delay();
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Attempt one task and return its updated record. Never fails: every
    /// task-level problem ends up in the record.
    async fn process_task(&self, mut record: TaskRecord) -> TaskRecord {
        if record.status == TaskStatus::Downloaded {
            debug!(task_id = %record.id, "Already downloaded, not reprocessing");
            return record;
        }

        let mut phase = TaskPhase::Fetching;
        debug!(task_id = %record.id, phase = %phase, "Rendering");
        let rendered = match tokio::time::timeout(
            self.config.render_timeout(),
            self.renderer.render(&record.url, &self.session),
        )
        .await
        {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return fail(record, phase, e),
            Err(_) => {
                let e = RenderError::Timeout {
                    url: record.url.clone(),
                    seconds: self.config.render_timeout_secs,
                };
                return fail(record, phase, e);
            }
        };

        phase = TaskPhase::Extracting;
        let project = match extract_project(&record.id, &record.url, &rendered.html) {
            Ok(project) => project,
            Err(e) => return fail(record, phase, e),
        };
        if let Err(e) = self.layout.write_details(&project).await {
            return fail(record, phase, format!("writing details: {e}"));
        }
        if record.title.is_none() {
            record.title = Some(project.title.clone());
        }
        let metadata = project.metadata();

        if !self.config.mode.downloads_images() {
            record.mark_downloaded(metadata, Utc::now());
            return record;
        }

        let manifest = match extract_manifest(&record.id, &rendered.final_url, &rendered.html) {
            Ok(manifest) => manifest,
            Err(e) => return fail(record, phase, e),
        };

        phase = TaskPhase::Downloading;
        debug!(task_id = %record.id, phase = %phase, images = manifest.len(), "Downloading gallery");
        let report = self
            .downloader
            .download(&record.id, &manifest, &self.layout.images_dir(&record.id))
            .await;

        if report.all_succeeded() {
            record.mark_downloaded(metadata, Utc::now());
        } else {
            warn!(
                task_id = %record.id,
                failed = report.failed(),
                total = manifest.len(),
                detail = %report.failure_summary().unwrap_or_default(),
                "Images missing, marking incomplete"
            );
            record.mark_incomplete(metadata, Utc::now());
        }
        record
    }
}

fn fail(mut record: TaskRecord, phase: TaskPhase, error: impl fmt::Display) -> TaskRecord {
    warn!(task_id = %record.id, phase = %phase, error = %error, "Task failed");
    record.mark_error(format!("{phase}: {error}"), Utc::now());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{sample_image_url, sample_project_html, MockAssetFetcher, MockFailure, MockRenderer};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(dir: &tempfile::TempDir, mode: RunMode) -> CrawlConfig {
        CrawlConfig::default()
            .with_output_dir(dir.path())
            .with_mode(mode)
            .with_task_delay(Duration::ZERO)
            .with_retry_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_text_only_marks_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new().with_page("https://example.com/1", sample_project_html("One", 2));
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));

        let summary = CrawlOrchestrator::new(
            renderer.clone(),
            store.clone(),
            MockAssetFetcher::new(),
            SessionState::new(),
            config(&dir, RunMode::TextOnly),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.downloaded, 1);
        let record = store.get("1").unwrap();
        assert_eq!(record.status, TaskStatus::Downloaded);
        assert_eq!(record.title.as_deref(), Some("One"));
        assert!(dir.path().join("1/1_details.json").exists());
        assert!(!dir.path().join("1/images").exists());
        assert!(renderer.is_closed());
    }

    #[tokio::test]
    async fn test_render_failure_records_phase() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new().with_failure("https://example.com/1", MockFailure::Blocked);
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));

        CrawlOrchestrator::new(
            renderer,
            store.clone(),
            MockAssetFetcher::new(),
            SessionState::new(),
            config(&dir, RunMode::Full),
        )
        .run()
        .await
        .unwrap();

        let record = store.get("1").unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert!(record.error_detail.unwrap().starts_with("fetching: blocked"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new().with_page("https://example.com/1", "<html><body></body></html>");
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));

        CrawlOrchestrator::new(
            renderer,
            store.clone(),
            MockAssetFetcher::new(),
            SessionState::new(),
            config(&dir, RunMode::Full),
        )
        .run()
        .await
        .unwrap();

        let record = store.get("1").unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert!(record.error_detail.unwrap().starts_with("extracting:"));
    }

    #[tokio::test]
    async fn test_slow_render_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new()
            .with_page("https://example.com/1", sample_project_html("One", 0))
            .with_delay(Duration::from_secs(5));
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));

        CrawlOrchestrator::new(
            renderer,
            store.clone(),
            MockAssetFetcher::new(),
            SessionState::new(),
            config(&dir, RunMode::Full).with_render_timeout(Duration::from_secs(1)),
        )
        .run()
        .await
        .unwrap();

        let detail = store.get("1").unwrap().error_detail.unwrap();
        assert!(detail.contains("timed out"), "{detail}");
    }

    #[tokio::test]
    async fn test_image_failure_marks_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new().with_page("https://example.com/1", sample_project_html("One", 2));
        let fetcher = MockAssetFetcher::new()
            .with_image(sample_image_url("One", 1))
            .with_failure(sample_image_url("One", 2), MockFailure::Status(404));
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));

        CrawlOrchestrator::new(renderer, store.clone(), fetcher, SessionState::new(), config(&dir, RunMode::Full))
            .run()
            .await
            .unwrap();

        let record = store.get("1").unwrap();
        assert_eq!(record.status, TaskStatus::Incomplete);
        assert!(record.error_detail.is_none());
        assert!(dir.path().join("1/images/1_01.jpg").exists());
        assert!(!dir.path().join("1/images/1_02.jpg").exists());
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MockRenderer::new().with_page("https://example.com/1", sample_project_html("One", 0));
        let store = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "https://example.com/1")]));
        let token = CancellationToken::new();
        token.cancel();

        let summary = CrawlOrchestrator::new(
            renderer.clone(),
            store.clone(),
            MockAssetFetcher::new(),
            SessionState::new(),
            config(&dir, RunMode::Full),
        )
        .with_cancellation(token)
        .run()
        .await
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(store.commit_count(), 0);
        assert!(renderer.calls().is_empty());
        assert!(renderer.is_closed());
    }
}
