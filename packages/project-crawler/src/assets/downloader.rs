//! Asset downloader.
//!
//! Fetches every image of a manifest with bounded concurrency and per-image
//! retry, writes each file atomically and records tags/captions in a sidecar
//! JSON file. One image failing never affects the others.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AssetError, AssetResult};
use crate::extract::resolve_gallery_image;
use crate::fs::write_atomic;
use crate::traits::fetcher::{AssetFetcher, FetchedAsset};
use crate::types::config::CrawlConfig;
use crate::types::manifest::{
    DownloadReport, ImageDescriptor, ImageManifest, ImageResult, ImageStatus, SidecarEntry,
};

use super::filenames::{disambiguate, sanitize_filename};

/// Downloader tuning.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Images fetched at once
    pub max_concurrent: usize,
    /// Attempts per image, including the first
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * retry_backoff` before retrying
    pub retry_backoff: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

impl From<&CrawlConfig> for DownloaderConfig {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_downloads,
            max_attempts: config.max_download_attempts,
            retry_backoff: config.retry_backoff(),
            timeout: config.download_timeout(),
        }
    }
}

/// Sidecar file name for a task, safe to join onto its image directory.
pub fn sidecar_filename(task_id: &str) -> String {
    sanitize_filename(&format!("{task_id}_images.json"))
}

/// What one successful fetch produced.
struct FetchedImage {
    bytes: Vec<u8>,
    tags: Option<Vec<String>>,
    caption: Option<String>,
}

/// Downloads image manifests through an [`AssetFetcher`].
pub struct AssetDownloader<F: AssetFetcher> {
    fetcher: F,
    config: DownloaderConfig,
}

impl<F: AssetFetcher> AssetDownloader<F> {
    pub fn new(fetcher: F, config: DownloaderConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Download every image of `manifest` into `dir`.
    ///
    /// Returns one result per manifest entry, in manifest order. Never fails
    /// as a whole; problems are reported per image and for the sidecar.
    pub async fn download(&self, task_id: &str, manifest: &ImageManifest, dir: &Path) -> DownloadReport {
        if manifest.is_empty() {
            debug!(task_id = %task_id, "Empty manifest, nothing to download");
            return DownloadReport::default();
        }

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(task_id = %task_id, dir = %dir.display(), error = %e, "Cannot create image directory");
            let results = manifest
                .iter()
                .enumerate()
                .map(|(index, desc)| ImageResult {
                    index,
                    filename: desc.filename.clone(),
                    source_url: desc.source_url.clone(),
                    tags: desc.tags.clone(),
                    caption: desc.caption.clone(),
                    status: ImageStatus::Failed {
                        error: format!("cannot create image directory: {e}"),
                        attempts: 0,
                    },
                })
                .collect();
            return DownloadReport {
                results,
                sidecar_error: None,
            };
        }

        let sidecar_path = dir.join(sidecar_filename(task_id));
        let previous = read_sidecar(&sidecar_path).await;
        let filenames = disambiguate(&manifest.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>());

        let mut results: Vec<ImageResult> = stream::iter(manifest.iter().zip(filenames).enumerate())
            .map(|(index, (desc, filename))| {
                let previous = previous.get(&filename).cloned();
                self.download_one(index, desc, filename, dir, previous)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;
        results.sort_by_key(|r| r.index);

        let entries: Vec<SidecarEntry> = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| SidecarEntry {
                filename: r.filename.clone(),
                tags: r.tags.clone(),
                caption: r.caption.clone(),
            })
            .collect();

        let sidecar_error = if entries.is_empty() {
            None
        } else {
            write_sidecar(&sidecar_path, &entries).await.err()
        };

        let report = DownloadReport {
            results,
            sidecar_error,
        };
        info!(
            task_id = %task_id,
            total = manifest.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Image downloads finished"
        );
        report
    }

    async fn download_one(
        &self,
        index: usize,
        desc: &ImageDescriptor,
        filename: String,
        dir: &Path,
        previous: Option<SidecarEntry>,
    ) -> ImageResult {
        let target = dir.join(&filename);
        let mut result = ImageResult {
            index,
            filename,
            source_url: desc.source_url.clone(),
            tags: desc.tags.clone(),
            caption: desc.caption.clone(),
            status: ImageStatus::AlreadyPresent,
        };

        if is_present(&target).await {
            debug!(file = %target.display(), "Image already on disk, skipping");
            if let Some(previous) = previous {
                result.tags = previous.tags;
                result.caption = previous.caption;
            }
            return result;
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        let fetched = loop {
            attempt += 1;
            match self.fetch_image(&desc.source_url).await {
                Ok(fetched) => break Ok(fetched),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry_backoff * attempt;
                    debug!(
                        url = %desc.source_url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Image fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let outcome = match fetched {
            Ok(fetched) => {
                if let Some(tags) = fetched.tags.filter(|t| !t.is_empty()) {
                    result.tags = tags;
                }
                if let Some(caption) = fetched.caption {
                    result.caption = caption;
                }
                write_atomic(&target, &fetched.bytes)
                    .await
                    .map(|()| fetched.bytes.len() as u64)
                    .map_err(AssetError::from)
            }
            Err(e) => Err(e),
        };

        result.status = match outcome {
            Ok(bytes) => ImageStatus::Saved { bytes },
            Err(e) => {
                warn!(url = %desc.source_url, file = %result.filename, attempts = attempt, error = %e, "Image download failed");
                ImageStatus::Failed {
                    error: e.to_string(),
                    attempts: attempt,
                }
            }
        };
        result
    }

    /// Fetch image bytes, following a gallery viewer page if that is what
    /// the URL serves.
    async fn fetch_image(&self, url: &str) -> AssetResult<FetchedImage> {
        let asset = self.fetch_with_timeout(url).await?;
        if asset.is_image() {
            return Ok(FetchedImage {
                bytes: asset.bytes,
                tags: None,
                caption: None,
            });
        }
        if !asset.is_html() {
            return Err(AssetError::NotAnImage {
                content_type: asset.content_type_label(),
            });
        }

        // Resolve against the requested URL; redirects drop the fragment
        let html = String::from_utf8_lossy(&asset.bytes);
        let gallery = resolve_gallery_image(url, &html)?;
        debug!(page = %url, image = %gallery.url, "Resolved gallery image");

        let image = self.fetch_with_timeout(&gallery.url).await?;
        if !image.is_image() {
            return Err(AssetError::NotAnImage {
                content_type: image.content_type_label(),
            });
        }
        Ok(FetchedImage {
            bytes: image.bytes,
            tags: Some(gallery.tags),
            caption: gallery.caption,
        })
    }

    async fn fetch_with_timeout(&self, url: &str) -> AssetResult<FetchedAsset> {
        tokio::time::timeout(self.config.timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| AssetError::Timeout {
                seconds: self.config.timeout.as_secs(),
            })?
    }
}

async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

async fn read_sidecar(path: &Path) -> HashMap<String, SidecarEntry> {
    let Ok(json) = tokio::fs::read_to_string(path).await else {
        return HashMap::new();
    };
    match serde_json::from_str::<Vec<SidecarEntry>>(&json) {
        Ok(entries) => entries.into_iter().map(|e| (e.filename.clone(), e)).collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable image sidecar");
            HashMap::new()
        }
    }
}

async fn write_sidecar(path: &Path, entries: &[SidecarEntry]) -> Result<(), String> {
    let json = serde_json::to_vec_pretty(entries).map_err(|e| e.to_string())?;
    write_atomic(path, &json).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to write image sidecar");
        e.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAssetFetcher, MockFailure, JPEG_BYTES};

    fn config() -> DownloaderConfig {
        DownloaderConfig {
            max_concurrent: 3,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    fn manifest(n: usize) -> ImageManifest {
        ImageManifest::new(
            (1..=n)
                .map(|i| {
                    ImageDescriptor::new(
                        format!("https://cdn.example.com/{i}.jpg"),
                        format!("p_{i:02}.jpg"),
                    )
                    .with_caption(format!("Photo {i}"))
                })
                .collect(),
        )
    }

    fn fetcher_for(n: usize) -> MockAssetFetcher {
        (1..=n).fold(MockAssetFetcher::new(), |f, i| {
            f.with_image(format!("https://cdn.example.com/{i}.jpg"))
        })
    }

    #[tokio::test]
    async fn test_downloads_all_in_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = AssetDownloader::new(fetcher_for(4), config());

        let report = downloader.download("p", &manifest(4), dir.path()).await;

        assert!(report.all_succeeded());
        let names: Vec<_> = report.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["p_01.jpg", "p_02.jpg", "p_03.jpg", "p_04.jpg"]);
        for name in names {
            assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), JPEG_BYTES);
        }

        let sidecar: Vec<SidecarEntry> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("p_images.json")).unwrap())
                .unwrap();
        assert_eq!(sidecar.len(), 4);
        assert_eq!(sidecar[2].caption, "Photo 3");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_others() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_for(5).with_failure("https://cdn.example.com/3.jpg", MockFailure::Status(404));
        let downloader = AssetDownloader::new(fetcher.clone(), config());

        let report = downloader.download("p", &manifest(5), dir.path()).await;

        assert_eq!(report.succeeded(), 4);
        assert!(!report.all_succeeded());
        assert!(matches!(
            report.results[2].status,
            ImageStatus::Failed { attempts: 1, .. }
        ));
        assert!(!dir.path().join("p_03.jpg").exists());
        assert!(dir.path().join("p_05.jpg").exists());
        // 404 is not retried
        assert_eq!(fetcher.calls_for("https://cdn.example.com/3.jpg"), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_for(1).with_failure("https://cdn.example.com/1.jpg", MockFailure::Status(503));
        let downloader = AssetDownloader::new(fetcher.clone(), config());

        let report = downloader.download("p", &manifest(1), dir.path()).await;

        assert!(matches!(
            report.results[0].status,
            ImageStatus::Failed { attempts: 3, .. }
        ));
        assert_eq!(fetcher.calls_for("https://cdn.example.com/1.jpg"), 3);
        assert!(!dir.path().join("p_images.json").exists());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_for(1).with_transient_failures("https://cdn.example.com/1.jpg", 2);
        let downloader = AssetDownloader::new(fetcher.clone(), config());

        let report = downloader.download("p", &manifest(1), dir.path()).await;

        assert!(report.all_succeeded());
        assert_eq!(fetcher.calls_for("https://cdn.example.com/1.jpg"), 3);
    }

    #[tokio::test]
    async fn test_non_image_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockAssetFetcher::new().with_asset(
            "https://cdn.example.com/1.jpg",
            "application/json",
            b"{}".to_vec(),
        );
        let downloader = AssetDownloader::new(fetcher, config());

        let report = downloader.download("p", &manifest(1), dir.path()).await;
        assert!(matches!(
            &report.results[0].status,
            ImageStatus::Failed { error, .. } if error.contains("not an image")
        ));
    }

    #[tokio::test]
    async fn test_existing_files_are_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p_01.jpg"), JPEG_BYTES).unwrap();
        let fetcher = fetcher_for(2);
        let downloader = AssetDownloader::new(fetcher.clone(), config());

        let report = downloader.download("p", &manifest(2), dir.path()).await;

        assert_eq!(report.results[0].status, ImageStatus::AlreadyPresent);
        assert!(matches!(report.results[1].status, ImageStatus::Saved { .. }));
        assert_eq!(fetcher.calls_for("https://cdn.example.com/1.jpg"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_filenames_disambiguated() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ImageManifest::new(vec![
            ImageDescriptor::new("https://cdn.example.com/1.jpg", "a.jpg"),
            ImageDescriptor::new("https://cdn.example.com/2.jpg", "a.jpg"),
        ]);
        let downloader = AssetDownloader::new(fetcher_for(2), config());

        let report = downloader.download("p", &manifest, dir.path()).await;

        assert!(report.all_succeeded());
        assert!(dir.path().join("a.jpg").exists());
        assert!(dir.path().join("a_2.jpg").exists());
    }

    #[tokio::test]
    async fn test_gallery_page_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let page = "https://example.com/1001/museum/222-photo";
        let viewer = r#"<html><div id="gallery-items" data-id="222" data-images='[
            {"link": "/1001/museum/222-photo", "url_large": "https://cdn.example.com/large/222.jpg",
             "caption": "Atrium", "tags": [{"name": "Interior"}]}]'></div></html>"#;
        let fetcher = MockAssetFetcher::new()
            .with_asset(page, "text/html; charset=utf-8", viewer.as_bytes().to_vec())
            .with_image("https://cdn.example.com/large/222.jpg");
        let downloader = AssetDownloader::new(fetcher, config());
        let manifest = ImageManifest::new(vec![
            ImageDescriptor::new(page, "m_01.jpg").with_caption("thumb title")
        ]);

        let report = downloader.download("m", &manifest, dir.path()).await;

        assert!(report.all_succeeded());
        assert_eq!(report.results[0].caption, "Atrium");
        assert_eq!(report.results[0].tags, vec!["Interior"]);
        assert!(dir.path().join("m_01.jpg").exists());
    }

    #[tokio::test]
    async fn test_sidecar_stays_inside_images_dir() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("task").join("images");
        let downloader = AssetDownloader::new(fetcher_for(1), config());

        let report = downloader.download("../../escape", &manifest(1), &images).await;

        assert!(report.all_succeeded());
        assert_eq!(sidecar_filename("../../escape"), "_.._escape_images.json");
        assert!(images.join("_.._escape_images.json").exists());
        assert!(!dir.path().join("escape_images.json").exists());
    }

    #[tokio::test]
    async fn test_empty_manifest_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let downloader = AssetDownloader::new(MockAssetFetcher::new(), config());

        let report = downloader.download("p", &ImageManifest::default(), &images).await;

        assert!(report.all_succeeded());
        assert!(!images.exists());
    }
}
