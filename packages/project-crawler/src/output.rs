//! Per-task output layout and the collect step.
//!
//! ```text
//! <output_dir>/<id>/<id>_details.json
//! <output_dir>/<id>/images/<id>_01.jpg ...
//! <output_dir>/<id>/images/<id>_images.json
//! ```

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::assets::downloader::sidecar_filename;
use crate::assets::filenames::sanitize_filename;
use crate::error::{CrawlError, Result};
use crate::fs::write_atomic;
use crate::types::manifest::SidecarEntry;
use crate::types::project::ProjectRecord;

/// Paths of everything written for a task.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a task id, safe to join.
    pub fn dir_name(id: &str) -> String {
        sanitize_filename(id)
    }

    pub fn task_dir(&self, id: &str) -> PathBuf {
        self.root.join(Self::dir_name(id))
    }

    pub fn images_dir(&self, id: &str) -> PathBuf {
        self.task_dir(id).join("images")
    }

    pub fn details_path(&self, id: &str) -> PathBuf {
        let name = Self::dir_name(id);
        self.task_dir(id).join(format!("{name}_details.json"))
    }

    pub fn sidecar_path(&self, id: &str) -> PathBuf {
        self.images_dir(id).join(sidecar_filename(id))
    }

    /// Write the project document atomically, creating the task directory.
    pub async fn write_details(&self, record: &ProjectRecord) -> std::io::Result<PathBuf> {
        let path = self.details_path(&record.id);
        tokio::fs::create_dir_all(self.task_dir(&record.id)).await?;
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &json).await?;
        debug!(task_id = %record.id, path = %path.display(), "Wrote project details");
        Ok(path)
    }
}

/// Totals from a collect pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Task directories seen
    pub total: usize,
    /// Details merged with their image sidecar
    pub merged: usize,
    /// Details collected without images
    pub without_images: usize,
    /// Directories with no details document
    pub skipped: usize,
    /// Directories that could not be read or written
    pub failed: usize,
}

impl CollectReport {
    pub fn collected(&self) -> usize {
        self.merged + self.without_images
    }
}

enum Collected {
    Merged,
    WithoutImages,
    Skipped,
}

/// Merge each task's image sidecar into its details document and gather the
/// results as `<into>/<id>.json`.
///
/// The merged document is also written beside the details as
/// `<output_dir>/<id>/<id>.json`. A problem with one directory is counted
/// and logged; only an unusable root or target fails the pass.
pub async fn collect(layout: &OutputLayout, into: &Path) -> Result<CollectReport> {
    let output_error = |path: &Path| {
        let path = path.display().to_string();
        move |source| CrawlError::Output { path, source }
    };

    tokio::fs::create_dir_all(into)
        .await
        .map_err(output_error(into))?;
    let into_canonical = tokio::fs::canonicalize(into).await.ok();

    let mut entries = tokio::fs::read_dir(layout.root())
        .await
        .map_err(output_error(layout.root()))?;

    let mut report = CollectReport::default();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(output_error(layout.root()))?
    {
        let path = entry.path();
        if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        if into_canonical.is_some() && tokio::fs::canonicalize(&path).await.ok() == into_canonical {
            continue;
        }
        let Some(id) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        report.total += 1;
        match collect_one(layout, &id, into).await {
            Ok(Collected::Merged) => report.merged += 1,
            Ok(Collected::WithoutImages) => report.without_images += 1,
            Ok(Collected::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!(task_id = %id, error = %e, "Failed to collect task output");
                report.failed += 1;
            }
        }
    }

    info!(
        total = report.total,
        merged = report.merged,
        without_images = report.without_images,
        skipped = report.skipped,
        failed = report.failed,
        into = %into.display(),
        "Collect finished"
    );
    Ok(report)
}

async fn collect_one(layout: &OutputLayout, id: &str, into: &Path) -> std::io::Result<Collected> {
    let details_path = layout.details_path(id);
    let details = match tokio::fs::read(&details_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(task_id = %id, "No details document, skipping");
            return Ok(Collected::Skipped);
        }
        Err(e) => return Err(e),
    };
    let target = into.join(format!("{}.json", OutputLayout::dir_name(id)));

    let images = match tokio::fs::read(layout.sidecar_path(id)).await {
        Ok(bytes) => match serde_json::from_slice::<Vec<SidecarEntry>>(&bytes) {
            Ok(images) => Some(images),
            Err(e) => {
                warn!(task_id = %id, error = %e, "Unreadable image sidecar, collecting without images");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let Some(images) = images else {
        write_atomic(&target, &details).await?;
        return Ok(Collected::WithoutImages);
    };

    let mut document: Map<String, Value> = serde_json::from_slice(&details)?;
    document.insert("images".to_string(), serde_json::to_value(images)?);
    let merged = serde_json::to_vec_pretty(&document)?;

    let name = OutputLayout::dir_name(id);
    write_atomic(&layout.task_dir(id).join(format!("{name}.json")), &merged).await?;
    write_atomic(&target, &merged).await?;
    Ok(Collected::Merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str) -> ProjectRecord {
        ProjectRecord {
            id: id.to_string(),
            title: format!("Project {id}"),
            url: format!("https://example.com/{id}"),
            categories: vec![],
            city: None,
            country: None,
            architects: vec![],
            area: None,
            year: None,
            description: vec!["A long enough paragraph of text.".into()],
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/data");
        assert_eq!(layout.details_path("1001"), PathBuf::from("/data/1001/1001_details.json"));
        assert_eq!(
            layout.sidecar_path("1001"),
            PathBuf::from("/data/1001/images/1001_images.json")
        );
        assert_eq!(layout.task_dir("../x"), PathBuf::from("/data/_x"));
    }

    #[tokio::test]
    async fn test_write_details() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());

        let path = layout.write_details(&project("7")).await.unwrap();
        let back: ProjectRecord = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(back, project("7"));
    }

    #[tokio::test]
    async fn test_collect_merges_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("data"));
        let into = dir.path().join("jsons");

        layout.write_details(&project("1")).await.unwrap();
        layout.write_details(&project("2")).await.unwrap();
        std::fs::create_dir_all(layout.images_dir("1")).unwrap();
        std::fs::write(
            layout.sidecar_path("1"),
            r#"[{"filename": "1_01.jpg", "tags": ["Facade"], "caption": "Front"}]"#,
        )
        .unwrap();
        std::fs::create_dir_all(layout.task_dir("3")).unwrap();

        let report = collect(&layout, &into).await.unwrap();

        assert_eq!(
            report,
            CollectReport {
                total: 3,
                merged: 1,
                without_images: 1,
                skipped: 1,
                failed: 0
            }
        );
        let merged: Value = serde_json::from_slice(&std::fs::read(into.join("1.json")).unwrap()).unwrap();
        assert_eq!(merged["images"][0]["caption"], "Front");
        assert_eq!(merged["title"], "Project 1");
        assert!(layout.task_dir("1").join("1.json").exists());
        assert!(into.join("2.json").exists());
    }

    #[tokio::test]
    async fn test_collect_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("missing"));
        let err = collect(&layout, &dir.path().join("out")).await.unwrap_err();
        assert!(matches!(err, CrawlError::Output { .. }));
    }
}
