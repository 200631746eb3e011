//! Task types - seeds from discovery and the durable task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::config::RunMode;

/// A project found by the discovery stage.
///
/// Seeds are immutable; the checkpoint store turns each unseen one into a
/// `pending` [`TaskRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSeed {
    /// Stable project identifier (primary key)
    pub id: String,

    /// Project page URL
    pub url: String,

    /// Title as seen in the listing, if any
    pub title: Option<String>,

    /// Discovery category or keyword
    pub category: Option<String>,
}

impl TaskSeed {
    /// Create a seed with just an id and URL.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            category: None,
        }
    }

    /// Set the listing title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the discovery category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Lifecycle status of a task.
///
/// A closed set so that actionability is a plain membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Never attempted
    Pending,
    /// Metadata, text and (in full mode) every image persisted
    Downloaded,
    /// Text persisted, one or more images missing
    Incomplete,
    /// Render or extraction failed
    Error,
    /// Marked for removal by discovery; never crawled
    Excluded,
}

impl TaskStatus {
    /// All statuses, in report order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Downloaded,
        TaskStatus::Incomplete,
        TaskStatus::Error,
        TaskStatus::Excluded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
            Self::Excluded => "excluded",
        }
    }

    /// Whether a run in `mode` should attempt a task with this status.
    ///
    /// Text-only runs skip `incomplete` tasks: their text is already on disk.
    pub fn is_actionable(&self, mode: RunMode) -> bool {
        match (self, mode) {
            (Self::Pending | Self::Error, _) => true,
            (Self::Incomplete, RunMode::Full) => true,
            (Self::Incomplete, RunMode::TextOnly) => false,
            (Self::Downloaded | Self::Excluded, _) => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is not part of the task lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(Self::Pending),
            "downloaded" => Ok(Self::Downloaded),
            "incomplete" => Ok(Self::Incomplete),
            "error" => Ok(Self::Error),
            // Discovery marks unwanted projects with these
            "excluded" | "delete" | "duplicate" => Ok(Self::Excluded),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Project metadata kept on the task record once extraction succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub architect: Option<String>,
    pub area: Option<String>,
    pub year: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
}

impl ProjectMetadata {
    /// Fill gaps in `self` from `fallback`.
    pub fn or(mut self, fallback: &ProjectMetadata) -> Self {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.architect, &fallback.architect);
        fill(&mut self.area, &fallback.area);
        fill(&mut self.year, &fallback.year);
        fill(&mut self.location, &fallback.location);
        fill(&mut self.category, &fallback.category);
        self
    }
}

/// The durable unit of work, one per discovered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Only set while `status` is `error`
    pub error_detail: Option<String>,
}

impl TaskRecord {
    /// Create a pending record.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            status: TaskStatus::Pending,
            metadata: ProjectMetadata::default(),
            last_attempt: None,
            error_detail: None,
        }
    }

    /// Create the initial record for a discovered project.
    pub fn from_seed(seed: &TaskSeed) -> Self {
        let mut record = Self::new(&seed.id, &seed.url);
        record.title = seed.title.clone();
        record.metadata.category = seed.category.clone();
        record
    }

    /// Set the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Record a successful attempt.
    pub fn mark_downloaded(&mut self, metadata: ProjectMetadata, at: DateTime<Utc>) {
        self.settle(TaskStatus::Downloaded, Some(metadata), None, at);
    }

    /// Record an attempt whose text succeeded but whose images did not.
    pub fn mark_incomplete(&mut self, metadata: ProjectMetadata, at: DateTime<Utc>) {
        self.settle(TaskStatus::Incomplete, Some(metadata), None, at);
    }

    /// Record a failed attempt. Previously extracted metadata is kept.
    pub fn mark_error(&mut self, detail: impl Into<String>, at: DateTime<Utc>) {
        let detail = detail.into();
        let detail = if detail.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            detail
        };
        self.settle(TaskStatus::Error, None, Some(detail), at);
    }

    fn settle(
        &mut self,
        status: TaskStatus,
        metadata: Option<ProjectMetadata>,
        error_detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        if let Some(metadata) = metadata {
            self.metadata = metadata.or(&self.metadata);
        }
        self.error_detail = error_detail;
        self.last_attempt = Some(at);
    }
}
