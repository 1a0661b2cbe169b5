// ABOUTME: Execution lock so only one destructive operation runs per deployment.
// ABOUTME: An flock-held lock file carrying JSON owner info, reclaimed when its owner is dead.

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Times to retry when the lock file is replaced under us.
const OPEN_ATTEMPTS: usize = 5;

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another operation is already running: {operation} by {holder} (pid {pid}) since {since}")]
    AlreadyRunning {
        pid: u32,
        holder: String,
        operation: String,
        since: DateTime<Utc>,
    },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock {} is held by another process", .0.display())]
    Busy(PathBuf),
}

/// Error categories for lock failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorKind {
    /// Another live process holds the lock.
    Contention,
    /// The lock file could not be read or written.
    Io,
}

impl LockError {
    pub fn kind(&self) -> LockErrorKind {
        match self {
            LockError::AlreadyRunning { .. } | LockError::Busy(_) => LockErrorKind::Contention,
            LockError::Io { .. } => LockErrorKind::Io,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn running(info: LockInfo) -> Self {
        LockError::AlreadyRunning {
            pid: info.pid,
            holder: info.holder,
            operation: info.operation,
            since: info.created_at,
        }
    }
}

/// Information about who holds the execution lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID of the lock holder.
    pub pid: u32,
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub created_at: DateTime<Utc>,
    /// Operation being run (`apply`, `restore`, ...).
    pub operation: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(operation: &str) -> Self {
        Self {
            pid: std::process::id(),
            holder: hostname(),
            created_at: Utc::now(),
            operation: operation.to_string(),
        }
    }

    /// A lock is stale when it was taken on this host by a process that no
    /// longer exists. Locks from other hosts are never considered stale.
    pub fn is_stale(&self) -> bool {
        self.holder == hostname() && !process_alive(self.pid)
    }

    fn is_ours(&self) -> bool {
        self.pid == std::process::id() && self.holder == hostname()
    }
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks for existence; EPERM means it exists under another user.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Single-flight guard over a lock file.
///
/// Exclusion comes from an advisory `flock` on the file, held for the
/// lifetime of the [`LockGuard`]. The kernel drops it when the owner dies,
/// so a crashed run never blocks the next one. The JSON content only names
/// the holder.
#[derive(Debug, Clone)]
pub struct ExecutionLock {
    path: PathBuf,
}

impl ExecutionLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock for `operation`.
    ///
    /// Never waits: a live holder yields [`LockError::AlreadyRunning`]
    /// immediately. A marker left by a dead process or with unreadable
    /// content is taken over with a warning. A marker naming a live process
    /// or another host is respected even when no one holds the flock.
    pub fn acquire(&self, operation: &str) -> Result<LockGuard, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
        }

        for _ in 0..OPEN_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)
                .map_err(|e| LockError::io(&self.path, e))?;

            let locked =
                FileExt::try_lock_exclusive(&file).map_err(|e| LockError::io(&self.path, e))?;
            if !locked {
                return Err(match self.read() {
                    Ok(Some(existing)) => LockError::running(existing),
                    _ => LockError::Busy(self.path.clone()),
                });
            }

            // A releasing holder unlinks the file before closing it; retry on the new one.
            if !self.is_current(&file)? {
                continue;
            }

            match self.read() {
                Ok(Some(existing)) if !existing.is_stale() => {
                    return Err(LockError::running(existing));
                }
                Ok(Some(existing)) => {
                    tracing::warn!(
                        "Breaking stale lock held by {} (pid {}) since {}",
                        existing.holder,
                        existing.pid,
                        existing.created_at
                    );
                }
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!("Lock info corrupted at {}, breaking lock", self.path.display());
                }
            }

            let info = LockInfo::new(operation);
            self.write(&file, &info)?;
            tracing::debug!(path = %self.path.display(), operation = %info.operation, "lock acquired");
            return Ok(LockGuard {
                path: self.path.clone(),
                info,
                _file: file,
            });
        }

        Err(LockError::Busy(self.path.clone()))
    }

    /// Read the current holder, if any.
    pub fn holder(&self) -> Result<Option<LockInfo>, LockError> {
        self.read()
    }

    /// Whether `file` is still the inode at the lock path.
    #[cfg(unix)]
    fn is_current(&self, file: &File) -> Result<bool, LockError> {
        use std::os::unix::fs::MetadataExt;

        let open = file.metadata().map_err(|e| LockError::io(&self.path, e))?;
        match std::fs::metadata(&self.path) {
            Ok(current) => Ok(open.dev() == current.dev() && open.ino() == current.ino()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    #[cfg(not(unix))]
    fn is_current(&self, _file: &File) -> Result<bool, LockError> {
        Ok(self.path.exists())
    }

    /// Replace the file content in place; only the flock holder writes.
    fn write(&self, mut file: &File, info: &LockInfo) -> Result<(), LockError> {
        let json = serde_json::to_vec(info)
            .map_err(|e| LockError::io(&self.path, std::io::Error::other(e)))?;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(&json))
            .and_then(|_| file.sync_all())
            .map_err(|e| LockError::io(&self.path, e))
    }

    /// Ok(None) when there is no lock file or it is empty; Err for unreadable
    /// or corrupted content.
    fn read(&self) -> Result<Option<LockInfo>, LockError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::io(&self.path, e)),
        };
        if content.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| LockError::io(&self.path, std::io::Error::other(e)))
    }
}

/// A held execution lock that releases on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
    // Holds the flock until the guard is dropped.
    _file: File,
}

impl LockGuard {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove the file if it still names us; someone may have rewritten it.
        let still_ours = std::fs::read(&self.path)
            .ok()
            .and_then(|c| serde_json::from_slice::<LockInfo>(&c).ok())
            .is_some_and(|existing| existing.is_ours() && existing.created_at == self.info.created_at);

        // The file is unlinked before the flock goes away with `_file`.
        if still_ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
            } else {
                tracing::debug!(path = %self.path.display(), "lock released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new("apply");

        assert_eq!(info.operation, "apply");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn own_lock_is_not_stale() {
        assert!(!LockInfo::new("apply").is_stale());
    }

    #[test]
    fn foreign_host_lock_is_never_stale() {
        let info = LockInfo {
            pid: u32::MAX,
            holder: "some-other-host.invalid".to_string(),
            created_at: Utc::now(),
            operation: "apply".to_string(),
        };
        assert!(!info.is_stale());
    }

    #[test]
    fn guard_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));

        let guard = lock.acquire("capture").unwrap();
        assert!(lock.path().exists());
        drop(guard);
        assert!(!lock.path().exists());
    }

    #[test]
    fn corrupted_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));
        std::fs::write(lock.path(), b"not json").unwrap();

        let guard = lock.acquire("restore").unwrap();
        assert_eq!(guard.info().operation, "restore");
    }

    #[test]
    fn empty_lock_file_has_no_holder() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));
        std::fs::write(lock.path(), b"").unwrap();

        assert!(lock.holder().unwrap().is_none());
        assert_eq!(lock.acquire("apply").unwrap().info().operation, "apply");
    }

    #[test]
    fn flock_held_elsewhere_blocks_even_without_owner_info() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));
        let other = File::create(lock.path()).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).unwrap());

        let err = lock.acquire("apply").unwrap_err();
        assert!(matches!(err, LockError::Busy(_)));
        assert_eq!(err.kind(), LockErrorKind::Contention);
    }

    #[test]
    fn replaced_file_is_not_current() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));
        let old = File::create(lock.path()).unwrap();
        std::fs::remove_file(lock.path()).unwrap();
        assert!(!lock.is_current(&old).unwrap());

        std::fs::write(lock.path(), b"").unwrap();
        assert!(!lock.is_current(&old).unwrap());
    }

    #[test]
    fn holder_reports_current_owner() {
        let dir = TempDir::new().unwrap();
        let lock = ExecutionLock::new(dir.path().join("bulwark.lock"));
        assert!(lock.holder().unwrap().is_none());

        let _guard = lock.acquire("apply").unwrap();
        let holder = lock.holder().unwrap().unwrap();
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(holder.operation, "apply");
    }
}
