//! Workspace containment and the local-disk file store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use trawl_core::{DirEntry, FileStore, ToolFault};

// ─── Path safety ─────────────────────────────────────────────────

/// The fixed root every file-store path is resolved against.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to a location that is the root itself or
    /// strictly under it.
    ///
    /// Absolute paths are rejected outright. `.` and `..` are folded
    /// lexically; stepping above the root is `PermissionDenied`. When the
    /// target (or its closest existing ancestor) is on disk, its canonical
    /// form must also stay under the canonical root, so symlinks cannot
    /// smuggle a path out.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolFault> {
        let path = Path::new(raw);
        if path.is_absolute() || path.has_root() {
            return Err(ToolFault::permission_denied(format!(
                "absolute path '{raw}' is not allowed"
            )));
        }

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(ToolFault::permission_denied(format!(
                            "path '{raw}' escapes the workspace root"
                        )));
                    }
                }
                Component::Normal(p) => parts.push(p),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolFault::permission_denied(format!(
                        "absolute path '{raw}' is not allowed"
                    )));
                }
            }
        }

        let resolved = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));
        self.check_on_disk(raw, &resolved)?;
        Ok(resolved)
    }

    /// Make `resolved` relative to the root again, for reporting.
    pub fn relative<'a>(&self, resolved: &'a Path) -> &'a Path {
        resolved.strip_prefix(&self.root).unwrap_or(resolved)
    }

    fn check_on_disk(&self, raw: &str, resolved: &Path) -> Result<(), ToolFault> {
        let Ok(canonical_root) = self.root.canonicalize() else {
            // Root not created yet: nothing on disk can point elsewhere.
            return Ok(());
        };
        let existing = resolved.ancestors().find(|a| a.exists());
        let Some(existing) = existing else {
            return Ok(());
        };
        let canonical = existing.canonicalize().map_err(|e| {
            ToolFault::permission_denied(format!("cannot resolve '{raw}': {e}"))
        })?;
        if !canonical.starts_with(&canonical_root) {
            return Err(ToolFault::permission_denied(format!(
                "path '{raw}' resolves outside the workspace root"
            )));
        }
        Ok(())
    }
}

// ─── Local file store ────────────────────────────────────────────

/// File store over the local filesystem.
///
/// Shared by every task in a project. Writes and deletes to the same path
/// are serialised; the last writer wins.
#[derive(Default)]
pub struct LocalFileStore {
    locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl LocalFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry for `path` unless another call still holds it.
    fn release_lock(&self, path: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(path, |_, l| Arc::strong_count(l) == 1);
    }

    /// Paths with a write or delete in flight.
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    async fn write_locked(&self, path: &Path, content: &str) -> Result<(), ToolFault> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_fault("mkdir", parent, e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| io_fault("write", path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(())
    }

    async fn delete_locked(&self, path: &Path) -> Result<(), ToolFault> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_fault("delete", path, e))?;
        let result = if meta.is_dir() {
            warn!(path = %path.display(), "deleting directory tree");
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| io_fault("delete", path, e))
    }
}

fn io_fault(op: &str, path: &Path, e: std::io::Error) -> ToolFault {
    let reason = format!("{op} {}: {e}", path.display());
    match e.kind() {
        ErrorKind::NotFound => ToolFault::not_found(reason),
        ErrorKind::PermissionDenied => ToolFault::permission_denied(reason),
        ErrorKind::TimedOut => ToolFault::timeout(reason),
        _ => ToolFault::protocol(reason),
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &Path) -> Result<String, ToolFault> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_fault("read", path, e))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), ToolFault> {
        let lock = self.lock_for(path);
        let result = {
            let _guard = lock.lock().await;
            self.write_locked(path, content).await
        };
        self.release_lock(path, lock);
        result
    }

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ToolFault> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| io_fault("list", path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_fault("list", path, e))?
        {
            let is_dir = entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &Path) -> Result<(), ToolFault> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| io_fault("mkdir", path, e))
    }

    async fn delete(&self, path: &Path) -> Result<(), ToolFault> {
        let lock = self.lock_for(path);
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(path).await
        };
        self.release_lock(path, lock);
        result
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
