//! Image manifest and per-image download outcomes.

use serde::{Deserialize, Serialize};

/// One gallery image to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Image URL, or a gallery viewer page that names the image
    pub source_url: String,

    /// Declared file name inside the task's image directory
    pub filename: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub caption: String,
}

impl ImageDescriptor {
    pub fn new(source_url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            filename: filename.into(),
            tags: Vec::new(),
            caption: String::new(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered image descriptors derived from one rendered project page.
///
/// Ephemeral: only its outcome is folded into the task status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub images: Vec<ImageDescriptor>,
}

impl ImageManifest {
    pub fn new(images: Vec<ImageDescriptor>) -> Self {
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageDescriptor> {
        self.images.iter()
    }
}

/// Result of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    /// Fetched and written
    Saved { bytes: u64 },
    /// A non-empty file with this name was already on disk
    AlreadyPresent,
    /// Gave up after the given attempts
    Failed { error: String, attempts: u32 },
}

/// Outcome for one manifest entry, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    /// Position in the manifest
    pub index: usize,
    /// File name actually used (after disambiguation)
    pub filename: String,
    pub source_url: String,
    pub tags: Vec<String>,
    pub caption: String,
    pub status: ImageStatus,
}

impl ImageResult {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, ImageStatus::Failed { .. })
    }
}

/// Sidecar entry describing one saved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub caption: String,
}

/// Everything the downloader did for one manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub results: Vec<ImageResult>,
    /// Set when the sidecar metadata file could not be written
    pub sidecar_error: Option<String>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// True when every image and the sidecar were persisted. An empty
    /// manifest trivially succeeds.
    pub fn all_succeeded(&self) -> bool {
        self.sidecar_error.is_none() && self.results.iter().all(ImageResult::is_success)
    }

    /// Short human summary of what went wrong, for logs.
    pub fn failure_summary(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .results
            .iter()
            .filter_map(|r| match &r.status {
                ImageStatus::Failed { error, .. } => Some(format!("{}: {}", r.filename, error)),
                _ => None,
            })
            .collect();
        if let Some(err) = &self.sidecar_error {
            parts.push(format!("sidecar: {err}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
