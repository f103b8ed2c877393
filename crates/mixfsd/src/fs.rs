//! File capabilities invoked by the RPC engine.
//!
//! The engine only sees the [`FileStore`] trait. [`LocalFs`] implements it
//! on the host filesystem and uses `notify` for change notifications.

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::SeekFrom;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Failures of a file capability call.
///
/// The `Display` text is sent verbatim as the reason of an `"error"` reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The file could not be opened for reading and writing.
    #[error("error opening file (does it exist?)")]
    Open,
    /// Seeking to the requested offset failed.
    #[error("error seeking")]
    Seek,
    /// Reading the file failed.
    #[error("error reading file")]
    Read,
    /// Writing the file failed.
    #[error("error writing file")]
    Write,
    /// File metadata could not be read.
    #[error("failed to stat file")]
    Stat,
    /// The permission bits could not be changed.
    #[error("mode cannot be changed")]
    Chmod,
    /// The change watcher could not be created.
    #[error("watcher error")]
    Watcher,
    /// The file could not be registered with the watcher.
    #[error("file cannot be watched")]
    Watch,
}

/// A stream of change notifications for one file.
///
/// Dropping the value stops the underlying watcher.
pub struct FileWatch {
    events: mpsc::UnboundedReceiver<()>,
    _guard: Option<Box<dyn Send>>,
}

impl FileWatch {
    /// Wraps a receiver of change notifications and whatever must stay
    /// alive for them to keep arriving.
    #[must_use]
    pub fn new(events: mpsc::UnboundedReceiver<()>, guard: Option<Box<dyn Send>>) -> Self {
        Self {
            events,
            _guard: guard,
        }
    }

    /// Waits for the next write to the file. `None` once the watch closed.
    pub async fn changed(&mut self) -> Option<()> {
        self.events.recv().await
    }
}

/// The file operations the server exposes.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    /// Reads up to `length` bytes at `offset`, returning them with the
    /// file's modification time in unix seconds.
    async fn read(&self, path: &str, offset: u64, length: usize) -> Result<(Vec<u8>, u64), FsError>;

    /// Overwrites bytes starting at `offset`.
    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<(), FsError>;

    /// Appends bytes at the end of the file.
    async fn append(&self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Returns the modification time in unix seconds.
    async fn last_write(&self, path: &str) -> Result<u64, FsError>;

    /// Sets the permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError>;

    /// Reads the whole file.
    async fn contents(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Starts watching the file for writes.
    fn watch(&self, path: &str) -> Result<FileWatch, FsError>;
}

/// [`FileStore`] over the host filesystem. Paths are used as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    async fn open(path: &str) -> Result<File, FsError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|_| FsError::Open)
    }

    async fn mtime(file: &File) -> Result<u64, FsError> {
        let modified = file
            .metadata()
            .await
            .and_then(|m| m.modified())
            .map_err(|_| FsError::Stat)?;
        Ok(unix_seconds(modified))
    }
}

fn unix_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[async_trait]
impl FileStore for LocalFs {
    async fn read(&self, path: &str, offset: u64, length: usize) -> Result<(Vec<u8>, u64), FsError> {
        let mut file = Self::open(path).await?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|_| FsError::Seek)?;
        let mut buf = Vec::with_capacity(length);
        (&mut file)
            .take(length as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(|_| FsError::Read)?;
        let mtime = Self::mtime(&file).await?;
        Ok((buf, mtime))
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<(), FsError> {
        let mut file = Self::open(path).await?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|_| FsError::Seek)?;
        file.write_all(data).await.map_err(|_| FsError::Write)?;
        file.flush().await.map_err(|_| FsError::Write)
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|_| FsError::Open)?;
        file.write_all(data).await.map_err(|_| FsError::Write)?;
        file.flush().await.map_err(|_| FsError::Write)
    }

    async fn last_write(&self, path: &str) -> Result<u64, FsError> {
        let file = Self::open(path).await?;
        Self::mtime(&file).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        let file = Self::open(path).await?;
        let mut perms = file
            .metadata()
            .await
            .map_err(|_| FsError::Stat)?
            .permissions();
        set_mode(&mut perms, mode);
        file.set_permissions(perms)
            .await
            .map_err(|_| FsError::Chmod)
    }

    async fn contents(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut file = Self::open(path).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|_| FsError::Read)?;
        Ok(buf)
    }

    fn watch(&self, path: &str) -> Result<FileWatch, FsError> {
        if !Path::new(path).is_file() {
            return Err(FsError::Open);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_write(&event.kind) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => debug!("file watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|_| FsError::Watcher)?;
        watcher
            .watch(Path::new(path), RecursiveMode::NonRecursive)
            .map_err(|_| FsError::Watch)?;
        Ok(FileWatch::new(rx, Some(Box::new(watcher))))
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
    )
}

#[cfg(unix)]
fn set_mode(perms: &mut std::fs::Permissions, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(mode);
}

#[cfg(not(unix))]
fn set_mode(perms: &mut std::fs::Permissions, mode: u32) {
    perms.set_readonly(mode & 0o222 == 0);
}
