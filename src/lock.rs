//! PID-file based exclusivity lock.
//!
//! One lock file guards one destination. Its existence plus the liveness of
//! the recorded process id together define "restore in progress". The lock is
//! advisory and filesystem-based: every invocation must acquire it before
//! either restore path touches the destination.
//!
//! A lock whose owner is confirmed dead is only reclaimed once the file is
//! also older than the staleness threshold; a crash leaves a short window in
//! which the lock still blocks, which beats racing a restart.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{error, warn};

use crate::error::RestoreError;

/// Default staleness threshold: one hour.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// An acquired exclusivity lock. Released explicitly with [`PidLock::release`]
/// or implicitly on drop, so cancellation and error paths cannot leak it.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl PidLock {
    /// Acquire the lock at `lock_path`, reclaiming a stale one at most once.
    ///
    /// Fails with `LockContention` when the recorded owner is alive, when the
    /// file is too young to assume abandonment, or when a stale file cannot
    /// be removed.
    pub fn acquire(lock_path: &Path, stale_after: Duration) -> Result<Self, RestoreError> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RestoreError::io(e, parent))?;
            }
        }

        let pid = std::process::id();
        for attempt in 0..2 {
            match write_new_lock(lock_path, pid) {
                Ok(()) => {
                    return Ok(PidLock {
                        path: lock_path.to_path_buf(),
                        pid,
                        released: false,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt > 0 {
                        error!("failed to acquire lockfile after cleanup");
                        return Err(RestoreError::LockContention(lock_path.to_path_buf()));
                    }

                    let owner = fs::read_to_string(lock_path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    if let Some(owner_pid) = owner {
                        if process_alive(owner_pid) {
                            return Err(RestoreError::LockContention(lock_path.to_path_buf()));
                        }
                    }

                    // Owner is dead or unverifiable; the file's own age decides.
                    match lock_age(lock_path) {
                        Ok(age) if age < stale_after => {
                            return Err(RestoreError::LockContention(lock_path.to_path_buf()));
                        }
                        Ok(age) => warn!(
                            "reclaiming stale lockfile (pid {}, age {}s); retrying",
                            owner.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
                            age.as_secs()
                        ),
                        Err(e) => {
                            warn!("could not stat lockfile ({e}); treating it as stale")
                        }
                    }

                    if let Err(e) = fs::remove_file(lock_path) {
                        error!("failed to remove stale lockfile {}: {e}", lock_path.display());
                        return Err(RestoreError::LockContention(lock_path.to_path_buf()));
                    }
                }
                Err(e) => return Err(RestoreError::io(e, lock_path)),
            }
        }
        Err(RestoreError::LockContention(lock_path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock. A no-op when the file no longer holds this process's
    /// pid — another process's lock is never deleted.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.pid.to_string() => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("failed to remove lockfile {}: {e}", self.path.display());
                }
            }
            _ => {}
        }
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn write_new_lock(path: &Path, pid: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{pid}")
}

fn lock_age(path: &Path) -> io::Result<Duration> {
    let mtime = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(mtime)
        .unwrap_or(Duration::ZERO))
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs only an existence/permission probe.
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    // EPERM means the process exists but belongs to another user; that is
    // still a live owner and must not be misreported as dead.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // No portable probe; assume the owner is alive and let staleness decide.
    true
}
