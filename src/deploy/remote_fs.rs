//! Staging-directory operations on top of a remote filesystem session.
//!
//! [`RemoteFs`] is the set of primitive calls an SFTP session offers. The free
//! functions in this module compose them into the operations a deployment
//! needs: recursive delete, fresh directory creation and tree upload.

use std::path::Path;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{DeployError, Result};

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Primitive operations of an established remote filesystem session.
///
/// Implementations raise on every non-success status and never retry.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Stat `path`. "Not found" is `Ok(false)`; any other failure is an error.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List every entry of the directory at `path`.
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, path: &str) -> Result<()>;

    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Create or truncate `path` and write all of `contents` before closing it.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// End the session.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Totals for one [`upload_tree`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Join a remote directory and a child name with `/`.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Recursively delete `path` and everything below it.
///
/// Walks with an explicit stack instead of recursion, so depth is bounded only
/// by heap. Files and symlinks are removed directly; directories are emptied
/// before they are removed. Any other entry kind aborts the whole delete.
pub async fn remove_tree(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    // (directory, children already handled)
    let mut pending = vec![(path.to_string(), false)];

    while let Some((dir, emptied)) = pending.pop() {
        if emptied {
            tracing::debug!("rmdir {}", dir);
            fs.remove_dir(&dir).await?;
            continue;
        }

        let entries = fs.read_dir(&dir).await?;
        pending.push((dir.clone(), true));

        for entry in entries.into_iter().filter(|e| !e.is_pseudo()) {
            let child = join_remote(&dir, &entry.name);
            match entry.kind {
                EntryKind::File | EntryKind::Symlink => {
                    tracing::debug!("rm {}", child);
                    fs.remove_file(&child).await?;
                }
                EntryKind::Directory => pending.push((child, false)),
                EntryKind::Unknown => return Err(DeployError::UnknownEntryKind { path: child }),
            }
        }
    }

    Ok(())
}

/// Make `path` an empty directory, deleting whatever was there before.
///
/// Re-checks existence after the create so a filesystem that acknowledged the
/// mkdir without applying it fails here rather than in a later phase.
pub async fn ensure_fresh_directory(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    if fs.exists(path).await? {
        tracing::debug!("Removing existing staging directory {}", path);
        remove_tree(fs, path).await?;
    }

    fs.create_dir(path).await?;

    if !fs.exists(path).await? {
        return Err(DeployError::StagingDirectoryMissing {
            path: path.to_string(),
        });
    }

    Ok(())
}

/// Upload the contents of `local` into the existing remote directory `remote`.
///
/// A plain file is uploaded into `remote` under its own name. The first
/// failure aborts the upload; files already transferred stay in place.
pub async fn upload_tree(fs: &dyn RemoteFs, local: &Path, remote: &str) -> Result<UploadStats> {
    let mut stats = UploadStats::default();

    if local.is_file() {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DeployError::Config(format!("Invalid workspace path {}", local.display()))
            })?;
        stats.bytes += upload_file(fs, local, &join_remote(remote, &name)).await?;
        stats.files += 1;
        return Ok(stats);
    }

    let walker = WalkDir::new(local)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(local)
            .map_err(|e| DeployError::Config(format!("Invalid workspace entry: {}", e)))?;
        let target = relative
            .components()
            .fold(remote.to_string(), |acc, part| {
                join_remote(&acc, &part.as_os_str().to_string_lossy())
            });

        if entry.file_type().is_dir() {
            tracing::debug!("mkdir {}", target);
            fs.create_dir(&target).await?;
            stats.directories += 1;
        } else {
            stats.bytes += upload_file(fs, entry.path(), &target).await?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

async fn upload_file(fs: &dyn RemoteFs, local: &Path, remote: &str) -> Result<u64> {
    let content = tokio::fs::read(local).await.map_err(|e| {
        DeployError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read local file {}: {}", local.display(), e),
        ))
    })?;

    tracing::debug!("put {} -> {} ({} bytes)", local.display(), remote, content.len());
    fs.write_file(remote, &content).await?;

    Ok(content.len() as u64)
}
