//! CSV task list checkpoint store.
//!
//! The task list is a CSV file with a header row. Columns are found by
//! name, unknown columns are carried through untouched.
//!
//! Writers take the advisory lock on `<task list>.lock`, re-read the file and
//! rewrite it in place, so rows appended by another process since `load`, or
//! through a handle it still holds open, are kept. An interrupted rewrite is
//! finished from its journal before the next read.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::fs::{self, FileLock};
use crate::traits::store::{CheckpointStore, SeedReport};
use crate::types::task::{ProjectMetadata, TaskRecord, TaskSeed, TaskStatus};

/// Known columns of the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Id,
    Url,
    Title,
    Status,
    Architect,
    Area,
    Year,
    Location,
    Category,
    ErrorDetail,
    LastAttempt,
}

impl Field {
    /// Canonical column order for new files.
    const ALL: [Field; 11] = [
        Field::Id,
        Field::Url,
        Field::Title,
        Field::Status,
        Field::Architect,
        Field::Area,
        Field::Year,
        Field::Location,
        Field::Category,
        Field::ErrorDetail,
        Field::LastAttempt,
    ];

    fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Url => "url",
            Self::Title => "title",
            Self::Status => "status",
            Self::Architect => "architect",
            Self::Area => "area",
            Self::Year => "year",
            Self::Location => "location",
            Self::Category => "category",
            Self::ErrorDetail => "error_detail",
            Self::LastAttempt => "last_attempt_timestamp",
        }
    }

    /// Names written by the discovery stage.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Id => &["project_id"],
            Self::Url => &["link", "project_url"],
            Self::Category => &["keyword"],
            Self::LastAttempt => &["last_attempt"],
            _ => &[],
        }
    }

    fn from_header(name: &str) -> Option<Field> {
        let name = name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.column() == name || f.aliases().contains(&name.as_str()))
    }
}

/// Raw contents of the task list.
#[derive(Debug)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: HashMap<Field, usize>,
}

impl Table {
    fn empty() -> Self {
        let headers: Vec<String> = Field::ALL.iter().map(|f| f.column().to_string()).collect();
        let columns = Field::ALL.iter().enumerate().map(|(i, f)| (*f, i)).collect();
        Self {
            headers,
            rows: Vec::new(),
            columns,
        }
    }

    fn read(path: &Path) -> StoreResult<Self> {
        let location = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_to_store(&location, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| StoreError::corrupt(&location, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(StoreError::corrupt(&location, "missing header row"));
        }

        let mut columns = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            if let Some(field) = Field::from_header(name) {
                columns.entry(field).or_insert(i);
            }
        }
        for required in [Field::Id, Field::Url] {
            if !columns.contains_key(&required) {
                return Err(StoreError::corrupt(
                    &location,
                    format!("missing required column `{}`", required.column()),
                ));
            }
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| StoreError::corrupt(&location, e.to_string()))?;
            if record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len().max(row.len()), String::new());
            rows.push(row);
        }

        Ok(Self {
            headers,
            rows,
            columns,
        })
    }

    fn read_or_empty(path: &Path) -> StoreResult<Self> {
        if path.exists() {
            Self::read(path)
        } else {
            Ok(Self::empty())
        }
    }

    fn get<'a>(&self, row: &'a [String], field: Field) -> &'a str {
        self.columns
            .get(&field)
            .and_then(|&i| row.get(i))
            .map(|v| v.trim())
            .unwrap_or("")
    }

    fn opt(&self, row: &[String], field: Field) -> Option<String> {
        let value = self.get(row, field);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn set(&self, row: &mut Vec<String>, field: Field, value: Option<&str>) {
        if let Some(&i) = self.columns.get(&field) {
            if row.len() <= i {
                row.resize(i + 1, String::new());
            }
            row[i] = value.unwrap_or("").to_string();
        }
    }

    /// Append any canonical column the file does not have yet.
    fn ensure_columns(&mut self) {
        for field in Field::ALL {
            if !self.columns.contains_key(&field) {
                self.columns.insert(field, self.headers.len());
                self.headers.push(field.column().to_string());
            }
        }
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }

    fn find(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|row| self.get(row, Field::Id) == id)
    }

    fn parse(&self, row: &[String], line: usize, location: &str) -> StoreResult<TaskRecord> {
        let id = self.get(row, Field::Id);
        if id.is_empty() {
            return Err(StoreError::corrupt(location, format!("row {line}: empty id")));
        }

        let status: TaskStatus = self
            .get(row, Field::Status)
            .parse()
            .map_err(|e| StoreError::corrupt(location, format!("row {line}: {e}")))?;

        let last_attempt = match self.get(row, Field::LastAttempt) {
            "" => None,
            raw => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| {
                        StoreError::corrupt(location, format!("row {line}: bad timestamp {raw:?}: {e}"))
                    })?
                    .with_timezone(&Utc),
            ),
        };

        Ok(TaskRecord {
            id: id.to_string(),
            url: self.get(row, Field::Url).to_string(),
            title: self.opt(row, Field::Title),
            status,
            metadata: ProjectMetadata {
                architect: self.opt(row, Field::Architect),
                area: self.opt(row, Field::Area),
                year: self.opt(row, Field::Year),
                location: self.opt(row, Field::Location),
                category: self.opt(row, Field::Category),
            },
            last_attempt,
            error_detail: if status == TaskStatus::Error {
                self.opt(row, Field::ErrorDetail)
            } else {
                None
            },
        })
    }

    fn records(&self, location: &str) -> StoreResult<Vec<TaskRecord>> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut records = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            // Header is line 1
            let record = self.parse(row, i + 2, location)?;
            if !seen.insert(record.id.clone()) {
                return Err(StoreError::corrupt(
                    location,
                    format!("duplicate id {:?} at row {}", record.id, i + 2),
                ));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn write_record(&self, row: &mut Vec<String>, record: &TaskRecord) {
        let timestamp = record
            .last_attempt
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));
        let error_detail = match record.status {
            TaskStatus::Error => record.error_detail.as_deref(),
            _ => None,
        };

        self.set(row, Field::Id, Some(&record.id));
        self.set(row, Field::Url, Some(&record.url));
        self.set(row, Field::Title, record.title.as_deref());
        self.set(row, Field::Status, Some(record.status.as_str()));
        self.set(row, Field::Architect, record.metadata.architect.as_deref());
        self.set(row, Field::Area, record.metadata.area.as_deref());
        self.set(row, Field::Year, record.metadata.year.as_deref());
        self.set(row, Field::Location, record.metadata.location.as_deref());
        self.set(row, Field::Category, record.metadata.category.as_deref());
        self.set(row, Field::ErrorDetail, error_detail);
        self.set(row, Field::LastAttempt, timestamp.as_deref());
    }

    fn new_row(&self, record: &TaskRecord) -> Vec<String> {
        let mut row = vec![String::new(); self.headers.len()];
        self.write_record(&mut row, record);
        row
    }

    fn write(&self, path: &Path) -> StoreResult<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        fs::rewrite_in_place_blocking(path, &bytes)?;
        Ok(())
    }
}

/// Run `f` holding the task list's file lock, after finishing any
/// interrupted rewrite.
fn with_file_lock<T>(path: &Path, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
    let _lock = FileLock::acquire(path)?;
    if fs::recover_rewrite_blocking(path)? {
        warn!(path = %path.display(), "Finished interrupted task list rewrite");
    }
    f()
}

fn csv_to_store(location: &str, error: csv::Error) -> StoreError {
    if error.is_io_error() {
        match error.into_kind() {
            csv::ErrorKind::Io(io) => StoreError::Io(io),
            other => StoreError::corrupt(location, format!("{other:?}")),
        }
    } else {
        StoreError::corrupt(location, error.to_string())
    }
}

/// Checkpoint store backed by the task list CSV file.
///
/// # Example
///
/// ```rust,ignore
/// use project_crawler::{CheckpointStore, CsvCheckpointStore, RunMode};
///
/// let store = CsvCheckpointStore::new("projects.csv");
/// let todo = store.select_actionable(RunMode::Full).await?;
/// ```
#[derive(Clone)]
pub struct CsvCheckpointStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CsvCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> StoreResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl CheckpointStore for CsvCheckpointStore {
    async fn load(&self) -> StoreResult<Vec<TaskRecord>> {
        let records = self
            .blocking(|path| {
                if fs::has_interrupted_rewrite(&path) {
                    with_file_lock(&path, || Ok(()))?;
                }
                let table = Table::read(&path)?;
                table.records(&path.display().to_string())
            })
            .await?;
        debug!(path = %self.path.display(), records = records.len(), "Loaded task list");
        Ok(records)
    }

    async fn commit(&self, record: &TaskRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = record.clone();

        self.blocking(move |path| {
            with_file_lock(&path, || {
                let mut table = Table::read_or_empty(&path)?;
                table.ensure_columns();

                match table.find(&record.id) {
                    Some(i) => {
                        let mut row = std::mem::take(&mut table.rows[i]);
                        table.write_record(&mut row, &record);
                        table.rows[i] = row;
                    }
                    None => {
                        warn!(task_id = %record.id, "Committed task missing from task list, appending");
                        let row = table.new_row(&record);
                        table.rows.push(row);
                    }
                }

                table.write(&path)
            })
        })
        .await
    }

    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport> {
        let _guard = self.write_lock.lock().await;
        let seeds = seeds.to_vec();

        let report = self
            .blocking(move |path| {
                with_file_lock(&path, || {
                    let mut table = Table::read_or_empty(&path)?;
                    let mut known: HashSet<String> = table
                        .rows
                        .iter()
                        .map(|row| table.get(row, Field::Id).to_string())
                        .collect();

                    let mut report = SeedReport::default();
                    let mut new_rows = Vec::new();
                    for seed in &seeds {
                        if known.insert(seed.id.clone()) {
                            new_rows.push(TaskRecord::from_seed(seed));
                            report.added += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }

                    if report.added > 0 || !path.exists() {
                        table.ensure_columns();
                        for record in &new_rows {
                            let row = table.new_row(record);
                            table.rows.push(row);
                        }
                        table.write(&path)?;
                    }
                    Ok(report)
                })
            })
            .await?;

        info!(
            path = %self.path.display(),
            added = report.added,
            skipped = report.skipped,
            "Seeded task list"
        );
        Ok(report)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Seeds read from a discovery-stage CSV file.
#[derive(Debug, Clone, Default)]
pub struct SeedImport {
    pub seeds: Vec<TaskSeed>,
    /// Rows discovery marked as deleted or duplicate
    pub excluded: usize,
    /// Rows without a usable id or URL
    pub invalid: usize,
}

/// Read discovery output (`id|project_id`, `url|link`, optional `title`,
/// `category|keyword`, optional `status`) into seeds.
pub async fn read_seeds(path: impl Into<PathBuf>) -> StoreResult<SeedImport> {
    let path = path.into();
    tokio::task::spawn_blocking(move || read_seeds_blocking(&path))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

fn read_seeds_blocking(path: &Path) -> StoreResult<SeedImport> {
    let location = path.display().to_string();
    let table = Table::read(path)?;
    let mut import = SeedImport::default();

    for (i, row) in table.rows.iter().enumerate() {
        let status: TaskStatus = table
            .get(row, Field::Status)
            .parse()
            .map_err(|e| StoreError::corrupt(&location, format!("row {}: {e}", i + 2)))?;
        if status == TaskStatus::Excluded {
            import.excluded += 1;
            continue;
        }

        let url = table.get(row, Field::Url);
        let id = match table.get(row, Field::Id) {
            "" => id_from_url(url),
            id => Some(id.to_string()),
        };
        let (Some(id), false) = (id, url.is_empty()) else {
            warn!(row = i + 2, "Skipping seed row without id or url");
            import.invalid += 1;
            continue;
        };

        let mut seed = TaskSeed::new(id, url);
        seed.title = table.opt(row, Field::Title);
        seed.category = table.opt(row, Field::Category);
        import.seeds.push(seed);
    }

    Ok(import)
}

/// Project pages carry their numeric id as a path segment.
fn id_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments = parsed.path_segments()?;
    segments
        .into_iter()
        .find(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::RunMode;
    use chrono::TimeZone;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_with_aliases_and_blank_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "tasks.csv",
            "project_id,link,keyword,status\n1,https://example.com/1/a,museum,\n2,https://example.com/2/b,museum,downloaded\n",
        );

        let records = CsvCheckpointStore::new(&path).load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, TaskStatus::Pending);
        assert_eq!(records[0].metadata.category.as_deref(), Some("museum"));
        assert_eq!(records[1].status, TaskStatus::Downloaded);
    }

    #[tokio::test]
    async fn test_missing_status_column_means_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "tasks.csv", "id,url\n1,https://example.com/1\n");

        let store = CsvCheckpointStore::new(&path);
        let todo = store.select_actionable(RunMode::TextOnly).await.unwrap();
        assert_eq!(todo.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("no_url.csv", "id,status\n1,pending\n"),
            ("bad_status.csv", "id,url,status\n1,https://example.com/1,finished\n"),
            ("dupe.csv", "id,url\n1,https://example.com/1\n1,https://example.com/1\n"),
            (
                "bad_time.csv",
                "id,url,last_attempt_timestamp\n1,https://example.com/1,yesterday\n",
            ),
            ("empty.csv", ""),
        ];

        for (name, contents) in cases {
            let path = write(&dir, name, contents);
            let err = CsvCheckpointStore::new(&path).load().await.unwrap_err();
            assert!(
                matches!(err, StoreError::CorruptState { .. }),
                "{name}: unexpected {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_commit_preserves_unknown_columns_and_other_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "tasks.csv",
            "id,url,status,notes\n1,https://example.com/1,,keep me\n2,https://example.com/2,error,x\n",
        );
        let store = CsvCheckpointStore::new(&path);

        let mut records = store.load().await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        records[0].mark_downloaded(
            ProjectMetadata {
                architect: Some("Studio, Alpha".into()),
                ..Default::default()
            },
            at,
        );
        store.commit(&records[0]).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded[0].status, TaskStatus::Downloaded);
        assert_eq!(reloaded[0].metadata.architect.as_deref(), Some("Studio, Alpha"));
        assert_eq!(reloaded[0].last_attempt, Some(at));
        assert_eq!(reloaded[1], records[1]);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("id,url,status,notes,title,"));
        assert!(raw.contains("keep me"));
    }

    #[tokio::test]
    async fn test_error_detail_only_kept_for_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "tasks.csv", "id,url\n1,https://example.com/1\n");
        let store = CsvCheckpointStore::new(&path);
        let mut record = store.load().await.unwrap().remove(0);

        record.mark_error("fetching: HTTP 500", Utc::now());
        store.commit(&record).await.unwrap();
        let loaded = store.load().await.unwrap().remove(0);
        assert_eq!(loaded.error_detail.as_deref(), Some("fetching: HTTP 500"));

        record.mark_incomplete(ProjectMetadata::default(), Utc::now());
        store.commit(&record).await.unwrap();
        let loaded = store.load().await.unwrap().remove(0);
        assert_eq!(loaded.status, TaskStatus::Incomplete);
        assert!(loaded.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_seed_creates_file_and_skips_known_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.csv");
        let store = CsvCheckpointStore::new(&path);

        let seeds = vec![
            TaskSeed::new("1", "https://example.com/1").with_title("One"),
            TaskSeed::new("2", "https://example.com/2"),
            TaskSeed::new("1", "https://example.com/1"),
        ];
        let report = store.seed(&seeds).await.unwrap();
        assert_eq!(report, SeedReport { added: 2, skipped: 1 });

        let report = store.seed(&seeds[..1]).await.unwrap();
        assert_eq!(report, SeedReport { added: 0, skipped: 1 });

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title.as_deref(), Some("One"));
        assert!(records.iter().all(|r| r.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_read_seeds_filters_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "found.csv",
            "project_id,link,title,keyword,status\n\
             11,https://example.com/11/a,A,museum,\n\
             12,https://example.com/12/b,B,museum,delete\n\
             ,https://example.com/13/c,C,museum,\n\
             ,,D,museum,\n\
             14,https://example.com/14/d,D,museum,duplicate\n",
        );

        let import = read_seeds(&path).await.unwrap();
        let ids: Vec<_> = import.seeds.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["11", "13"]);
        assert_eq!(import.excluded, 2);
        assert_eq!(import.invalid, 1);
        assert_eq!(import.seeds[0].category.as_deref(), Some("museum"));
    }
}
