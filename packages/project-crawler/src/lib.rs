//! Resumable crawler for architecture-project pages.
//!
//! Turns a flat task list into an interruption-safe pipeline: each project
//! page is rendered, its metadata and description extracted, its gallery
//! downloaded, and the outcome committed to the task list before the next
//! task starts. Re-running over the same list only retries what is not yet
//! `downloaded`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use project_crawler::{
//!     CrawlConfig, CrawlOrchestrator, CsvCheckpointStore, HttpAssetFetcher, HttpRenderer,
//!     RendererExt, SessionState,
//! };
//!
//! let config = CrawlConfig::default().with_task_list("projects.csv");
//! let renderer = HttpRenderer::new(&config)?.rate_limited(config.requests_per_second);
//! let fetcher = HttpAssetFetcher::new(&config)?;
//! let store = CsvCheckpointStore::new(&config.task_list);
//!
//! let summary = CrawlOrchestrator::new(renderer, store, fetcher, SessionState::new(), config)
//!     .run()
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams: Renderer, AssetFetcher, CheckpointStore
//! - [`types`] - Task records, manifests, config, session state
//! - [`orchestrator`] - Per-task state machine and run loop
//! - [`extract`] - Field extraction from rendered HTML
//! - [`assets`] - Image downloads with retry and bounded concurrency
//! - [`stores`] - CSV, in-memory and dry-run checkpoint stores
//! - [`renderers`] - HTTP renderer and rate limiting
//! - [`output`] - Per-task output layout and the collect step
//! - [`testing`] - Mock implementations for testing

pub mod assets;
pub mod error;
pub mod extract;
pub mod fs;
pub mod orchestrator;
pub mod output;
pub mod renderers;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    AssetError, CrawlError, ExtractionError, RenderError, SessionError, StoreError,
};
pub use traits::{
    fetcher::{AssetFetcher, FetchedAsset},
    renderer::{RenderedPage, Renderer},
    store::{CheckpointStore, SeedReport},
};
pub use types::{
    config::{CrawlConfig, RunMode},
    manifest::{DownloadReport, ImageDescriptor, ImageManifest, ImageResult, ImageStatus, SidecarEntry},
    project::ProjectRecord,
    session::SessionState,
    task::{ProjectMetadata, TaskRecord, TaskSeed, TaskStatus},
};

pub use assets::{AssetDownloader, DownloaderConfig, HttpAssetFetcher};
pub use extract::{extract_manifest, extract_project, resolve_gallery_image};
pub use orchestrator::{CrawlOrchestrator, RunSummary, TaskPhase};
pub use output::{collect, CollectReport, OutputLayout};
pub use renderers::{HttpRenderer, RateLimitedRenderer, RendererExt};
pub use stores::{read_seeds, CsvCheckpointStore, DryRunStore, MemoryStore, SeedImport};
