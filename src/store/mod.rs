//! Content-addressed object resolution.
//!
//! The object store is a flat directory where every file is named by the hash
//! of its content. The resolver is pure lookup-and-copy; it never writes into
//! the store. Stored objects may be kept raw or compressed, so retrieval runs
//! through the same magic-byte sniffing as archive streams.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::RestoreError;

/// Read-only view over one object store directory.
#[derive(Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Open the store at `root`; the directory must already exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RestoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RestoreError::ObjectStoreMissing(root));
        }
        Ok(Self { root })
    }

    /// Whether a hash looks like a plain content address. Hashes come from an
    /// untrusted manifest, so anything that could smuggle a path separator or
    /// traversal segment into the store lookup is refused here.
    pub fn is_valid_hash(hash: &str) -> bool {
        !hash.is_empty() && hash.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn object_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        Self::is_valid_hash(hash) && self.object_path(hash).is_file()
    }

    /// Copy (decompressing if needed) the object's bytes to `dest`, creating
    /// parent directories. Returns the number of bytes written.
    pub fn restore_object(&self, hash: &str, dest: &Path) -> Result<u64, RestoreError> {
        if !Self::is_valid_hash(hash) {
            return Err(RestoreError::ObjectMissing {
                hash: hash.to_string(),
            });
        }
        let source = self.object_path(hash);
        if !source.is_file() {
            return Err(RestoreError::ObjectMissing {
                hash: hash.to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| RestoreError::io(e, parent))?;
        }
        let mut reader = codec::open_decoded(&source).map_err(|e| RestoreError::io(e, &source))?;
        let mut out = File::create(dest).map_err(|e| RestoreError::io(e, dest))?;
        io::copy(&mut reader, &mut out).map_err(|e| RestoreError::io(e, dest))
    }
}
