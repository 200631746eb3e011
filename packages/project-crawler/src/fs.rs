//! Durable file writes.
//!
//! [`write_atomic`] replaces a file through temp file + fsync + rename, so
//! readers see either the old file or the new one, never a torn write.
//!
//! Shared files that other processes append to (the task list) use
//! [`rewrite_in_place_blocking`] instead: a rename would swap the inode out
//! from under their open handles. The new contents are journaled first, so an
//! interrupted rewrite is repaired by [`recover_rewrite_blocking`]. Writers
//! coordinate through [`FileLock`].

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}.tmp-{}", file_name(path), Uuid::new_v4().simple()))
}

fn journal_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}.journal", file_name(path)))
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.lock", file_name(path)))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Write `bytes` to `path` atomically.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);

    let result = write_then_rename(&tmp, path, bytes).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await?;
    sync_dir(parent_dir(path).to_path_buf()).await
}

/// Blocking variant for callers already on a blocking thread.
pub fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);

    let result = write_then_rename_blocking(&tmp, path, bytes);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename_blocking(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, path)?;
    sync_dir_blocking(parent_dir(path))
}

/// Flush directory entries (renames, unlinks) to disk.
#[cfg(unix)]
fn sync_dir_blocking(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir_blocking(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn sync_dir(dir: PathBuf) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || sync_dir_blocking(&dir))
        .await
        .map_err(std::io::Error::other)?
}

/// Replace the contents of `path` without replacing its inode.
///
/// Handles other processes hold open in append mode keep writing to the live
/// file. Callers hold the [`FileLock`] for `path`.
pub fn rewrite_in_place_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let journal = journal_path(path);
    write_atomic_blocking(&journal, bytes)?;
    overwrite_blocking(path, bytes)?;
    std::fs::remove_file(&journal)?;
    sync_dir_blocking(parent_dir(path))
}

fn overwrite_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
    file.write_all(bytes)?;
    file.set_len(bytes.len() as u64)?;
    file.flush()?;
    file.sync_all()
}

/// Whether a rewrite of `path` was interrupted before it finished.
pub fn has_interrupted_rewrite(path: &Path) -> bool {
    journal_path(path).exists()
}

/// Finish an interrupted rewrite of `path` from its journal.
///
/// Returns true when a journal was replayed. Callers hold the [`FileLock`].
pub fn recover_rewrite_blocking(path: &Path) -> std::io::Result<bool> {
    let journal = journal_path(path);
    let bytes = match std::fs::read(&journal) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    overwrite_blocking(path, &bytes)?;
    std::fs::remove_file(&journal)?;
    sync_dir_blocking(parent_dir(path))?;
    Ok(true)
}

/// Exclusive advisory lock on the sibling `<name>.lock` file of a path.
///
/// Blocks until every other holder, in this or another process, releases it.
/// Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
