//! Lock file management for daemon exclusivity
//!
//! One sidecar per state directory: two daemons would race on the state
//! markers and on the vault's git index.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "daemon.lock";

/// Held for the lifetime of the daemon
pub struct DaemonLock {
    path: PathBuf,
    // The flock lives as long as this handle
    _file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
pub struct LockContent {
    pub pid: u32,
    /// Unix milliseconds
    pub started_at: i64,
}

impl DaemonLock {
    /// Acquire the exclusive daemon lock in `state_dir`
    ///
    /// Fails if another live process holds it. A lock left behind by a dead
    /// process is removed and re-acquired.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        Self::acquire_inner(state_dir, true)
    }

    fn acquire_inner(state_dir: &Path, retry_stale: bool) -> Result<Self> {
        let lock_path = state_dir.join(LOCK_FILE);

        std::fs::create_dir_all(state_dir).context("Failed to create state directory")?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        if !try_flock_exclusive(&file)? {
            if retry_stale && Self::is_stale_lock(&mut file) {
                tracing::warn!(path = %lock_path.display(), "Removing stale daemon lock");
                drop(file);
                std::fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                return Self::acquire_inner(state_dir, false);
            }
            anyhow::bail!(
                "Daemon already running (lock {} held by an active process)",
                lock_path.display()
            );
        }

        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            _file: file,
        })
    }

    /// Release the lock and remove the lock file
    pub fn release(self) -> Result<()> {
        std::fs::remove_file(&self.path).context("Failed to remove lock file")?;
        Ok(())
    }

    /// PID of the daemon holding the lock in `state_dir`, if it is alive
    pub fn holder(state_dir: &Path) -> Option<LockContent> {
        let raw = std::fs::read_to_string(state_dir.join(LOCK_FILE)).ok()?;
        let content: LockContent = serde_json::from_str(&raw).ok()?;
        is_process_alive(content.pid).then_some(content)
    }

    fn is_stale_lock(file: &mut File) -> bool {
        match Self::read_lock_content(file) {
            Ok(content) => !is_process_alive(content.pid),
            // Unreadable content means the writer died mid-write
            Err(_) => true,
        }
    }

    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: Utc::now().timestamp_millis(),
        };

        let serialized =
            serde_json::to_string(&content).context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let content: LockContent =
            serde_json::from_str(&contents).context("Failed to deserialize lock content")?;
        Ok(content)
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to acquire an exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

/// Check if a process is alive
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 checks existence without delivering anything
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // EPERM: exists but owned by someone else
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
