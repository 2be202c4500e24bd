use std::io;
use std::path::PathBuf;

/// The primary error type for all operations in the `revault` crate.
///
/// Anything that could leave the destination half-written is fatal and carried
/// here; per-entry problems during a snapshot restore are accumulated into the
/// run summary instead and never surface as a `RestoreError`.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The backup archive does not exist.
    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// An archive member was rejected by the security policy. Nothing past the
    /// violating member is written and the staging tree is discarded.
    #[error("archive member '{member}' rejected: {reason}")]
    PolicyViolation { member: String, reason: &'static str },

    /// The archive declares more regular files than the configured cap.
    #[error("archive exceeds max-files limit")]
    MaxFilesExceeded,

    /// The cumulative declared size of the archive exceeds the configured cap.
    #[error("archive exceeds max-bytes limit")]
    MaxBytesExceeded,

    /// The deterministic staging directory already exists, which indicates a
    /// crashed previous run or a concurrent race. The engine refuses to clobber it.
    #[error("staging directory unexpectedly exists: {0}")]
    StagingConflict(PathBuf),

    /// The atomic swap failed, but the destination was rolled back to (or never
    /// left) its previous state.
    #[error("swap failed; destination is unchanged: {source}")]
    SwapRolledBack { source: io::Error },

    /// The atomic swap failed and the rollback failed too. The previous
    /// destination contents survive at `backup`; manual intervention required.
    #[error("swap failed and rollback failed; previous state preserved at '{}': {source}", backup.display())]
    SwapAbandoned { backup: PathBuf, source: io::Error },

    /// Another restore process holds the exclusivity lock.
    #[error("another restore holds the lock at '{}'", .0.display())]
    LockContention(PathBuf),

    /// The manifest could not be read or parsed. Always fatal: a snapshot
    /// restore never starts from a manifest it cannot fully trust.
    #[error("manifest '{}' unusable: {reason}", path.display())]
    BadManifest { path: PathBuf, reason: String },

    /// The object store directory backing a manifest is missing.
    #[error("object store not found at {0}")]
    ObjectStoreMissing(PathBuf),

    /// A requested object hash has no file in the object store.
    #[error("object {hash} missing from store")]
    ObjectMissing { hash: String },

    /// The snapshot destination and the vault overlap; restoring would write
    /// into (or clobber) the vault itself.
    #[error("destination '{}' overlaps the vault '{}'", dest.display(), vault.display())]
    VaultOverlap { dest: PathBuf, vault: PathBuf },

    /// Cooperative cancellation was observed between units of work.
    #[error("restore cancelled before completion")]
    Cancelled,

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },
}

impl RestoreError {
    /// Attach a path to a raw I/O error.
    pub fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        RestoreError::Io {
            source,
            path: path.into(),
        }
    }
}

// Generic IO error conversion that doesn't carry a path
impl From<io::Error> for RestoreError {
    fn from(err: io::Error) -> Self {
        RestoreError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}
