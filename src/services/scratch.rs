//! Scratch file lifecycle management
//!
//! Every intermediate output produced during a session is allocated here.
//! Allocation hands out a [`ScratchFile`] guard; dropping the guard without
//! calling [`ScratchFile::persist`] releases the file, so failure and
//! cancellation paths never leave registered outputs behind.
//!
//! A session owns `<root>/session-<id>/` and holds an exclusive lock on the
//! sibling `session-<id>.lock` for its lifetime. Sweeps only remove session
//! directories whose lock can be taken, so concurrent processes sharing a
//! root never delete each other's outputs.

use crate::error::{RemovalError, Result};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SESSION_PREFIX: &str = "session-";
const LOCK_EXTENSION: &str = "lock";

/// Held lock of a live session
struct SessionLock {
    file: Option<File>,
    path: PathBuf,
}

struct ScratchInner {
    root: PathBuf,
    dir: PathBuf,
    lock: SessionLock,
    registered: Mutex<HashSet<PathBuf>>,
}

impl Drop for ScratchInner {
    fn drop(&mut self) {
        // Leftover outputs stay for the next sweep
        if std::fs::remove_dir(&self.dir).is_ok() {
            drop(self.lock.file.take());
            let _ = std::fs::remove_file(&self.lock.path);
        }
    }
}

/// Process-scoped owner of scratch outputs
#[derive(Clone)]
pub struct ScratchManager {
    inner: Arc<ScratchInner>,
}

impl std::fmt::Debug for ScratchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchManager")
            .field("dir", &self.inner.dir)
            .field("registered", &self.registered().len())
            .finish()
    }
}

impl ScratchManager {
    /// Start a locked session under `root`
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the root, lock file or session
    /// directory cannot be created or locked
    pub fn open_session<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| RemovalError::file_io_error("create scratch directory", &root, &e))?;

        let name = format!("{}{}", SESSION_PREFIX, uuid::Uuid::new_v4());
        let lock_path = root.join(&name).with_extension(LOCK_EXTENSION);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| RemovalError::file_io_error("create session lock", &lock_path, &e))?;
        file.try_lock_exclusive()
            .map_err(|e| RemovalError::file_io_error("lock session", &lock_path, &e))?;

        let dir = root.join(&name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| RemovalError::file_io_error("create session directory", &dir, &e))?;
        debug!(dir = %dir.display(), "Opened scratch session");

        Ok(Self {
            inner: Arc::new(ScratchInner {
                root,
                dir,
                lock: SessionLock {
                    file: Some(file),
                    path: lock_path,
                },
                registered: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Session directory outputs are allocated into
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Root shared with other sessions
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // A poisoned registry still holds valid paths
        self.inner
            .registered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Allocate a unique, empty scratch file and register it
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the directory or file cannot be created
    pub fn allocate(&self, prefix: &str, extension: &str) -> Result<ScratchFile> {
        std::fs::create_dir_all(&self.inner.dir).map_err(|e| {
            RemovalError::file_io_error("create scratch directory", &self.inner.dir, &e)
        })?;

        let suffix = format!("_{}.{}", chrono::Utc::now().timestamp(), extension);
        let file = tempfile::Builder::new()
            .prefix(&format!("{}_", prefix))
            .suffix(&suffix)
            .tempfile_in(&self.inner.dir)
            .map_err(|e| RemovalError::file_io_error("create scratch file", &self.inner.dir, &e))?;
        let (_, path) = file
            .keep()
            .map_err(|e| RemovalError::file_io_error("keep scratch file", &self.inner.dir, &e.error))?;

        self.registry().insert(path.clone());
        debug!(path = %path.display(), "Allocated scratch file");

        Ok(ScratchFile {
            manager: self.clone(),
            path,
            armed: true,
        })
    }

    /// Remove a scratch file and forget it; missing files are fine
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when an existing file cannot be removed
    pub fn release<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.registry().remove(path);
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Released scratch file");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RemovalError::file_io_error("remove scratch file", path, &e)),
        }
    }

    /// Remove every registered file, any orphan left in the session
    /// directory and every stale sibling session
    ///
    /// Returns the number of files removed.
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the scratch directory cannot be listed
    pub fn cleanup_all(&self) -> Result<usize> {
        let registered: Vec<PathBuf> = self.registry().drain().collect();
        let mut removed = 0;

        for path in registered {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
            }
        }

        if self.inner.dir.exists() {
            let entries = std::fs::read_dir(&self.inner.dir).map_err(|e| {
                RemovalError::file_io_error("read scratch directory", &self.inner.dir, &e)
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed orphaned scratch file");
                        removed += 1;
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove orphaned scratch file");
                    },
                }
            }
        }

        removed += self.sweep_stale_sessions()?;

        debug!(removed, "Scratch cleanup finished");
        Ok(removed)
    }

    /// Remove sessions no live process holds, plus loose files in the root
    fn sweep_stale_sessions(&self) -> Result<usize> {
        let root = &self.inner.root;
        let entries = std::fs::read_dir(root)
            .map_err(|e| RemovalError::file_io_error("read scratch directory", root, &e))?;
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            // Already removed together with its lock file
            if path == self.inner.dir || path == self.inner.lock.path || !path.exists() {
                continue;
            }

            let is_lock = path.extension().is_some_and(|ext| ext == LOCK_EXTENSION);
            if path.is_dir() {
                // Locked sessions are handled through their lock file
                if is_session_name(&path) && !path.with_extension(LOCK_EXTENSION).exists() {
                    removed += remove_session_dir(&path);
                }
            } else if is_lock {
                removed += remove_if_stale(&path);
            } else {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed orphaned scratch file");
                        removed += 1;
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove orphaned scratch file");
                    },
                }
            }
        }

        Ok(removed)
    }

    #[must_use]
    pub fn is_registered<P: AsRef<Path>>(&self, path: P) -> bool {
        self.registry().contains(path.as_ref())
    }

    /// Snapshot of all registered paths
    #[must_use]
    pub fn registered(&self) -> Vec<PathBuf> {
        self.registry().iter().cloned().collect()
    }
}

fn is_session_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SESSION_PREFIX))
}

/// Remove a session whose lock nobody holds; returns removed file count
fn remove_if_stale(lock_path: &Path) -> usize {
    let Ok(file) = OpenOptions::new().write(true).open(lock_path) else {
        return 0;
    };
    if file.try_lock_exclusive().is_err() {
        debug!(lock = %lock_path.display(), "Skipping live scratch session");
        return 0;
    }

    let removed = remove_session_dir(&lock_path.with_extension(""));
    drop(file);
    if let Err(e) = std::fs::remove_file(lock_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(lock = %lock_path.display(), error = %e, "Failed to remove session lock");
        }
    }
    removed
}

fn remove_session_dir(dir: &Path) -> usize {
    let files = std::fs::read_dir(dir)
        .map(|entries| entries.flatten().filter(|e| e.path().is_file()).count())
        .unwrap_or(0);
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            info!(dir = %dir.display(), files, "Removed stale scratch session");
            files
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to remove stale scratch session");
            0
        },
    }
}

/// Scoped handle to an allocated scratch file
///
/// Released on drop unless persisted.
pub struct ScratchFile {
    manager: ScratchManager,
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file registered with the manager and return its path
    #[must_use]
    pub fn persist(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.manager.release(&self.path) {
                warn!(error = %e, "Failed to release scratch file");
            }
        }
    }
}
