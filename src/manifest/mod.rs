//! Versioned snapshot manifest model.
//!
//! A manifest maps destination-relative paths to content hashes. Version 1
//! values are bare hash strings; version 2 values carry the hash plus optional
//! mode/mtime metadata. The two shapes are resolved once at load time into an
//! explicit sum type instead of being re-inspected per file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::RestoreError;

/// Whole-manifest record. Read-only for the duration of a restore.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    /// Snapshot format version; absent means version 1.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Relative path -> entry. Ordered so a failed walk leaves a
    /// well-defined already-applied prefix.
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
}

fn default_version() -> u32 {
    1
}

/// One manifest value, either shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    /// Version 1: the value is the content hash itself.
    Hash(String),
    /// Version 2: hash plus optional metadata to reapply.
    Detailed {
        hash: String,
        #[serde(default)]
        mode: Option<u32>,
        /// Epoch seconds, applied to both atime and mtime.
        #[serde(default)]
        mtime: Option<f64>,
    },
}

impl ManifestEntry {
    pub fn hash(&self) -> &str {
        match self {
            ManifestEntry::Hash(h) => h,
            ManifestEntry::Detailed { hash, .. } => hash,
        }
    }

    pub fn mode(&self) -> Option<u32> {
        match self {
            ManifestEntry::Hash(_) => None,
            ManifestEntry::Detailed { mode, .. } => *mode,
        }
    }

    pub fn mtime(&self) -> Option<f64> {
        match self {
            ManifestEntry::Hash(_) => None,
            ManifestEntry::Detailed { mtime, .. } => *mtime,
        }
    }
}

/// Load and parse a manifest, failing fast on any read or parse problem.
pub fn load_manifest(path: &Path) -> Result<Manifest, RestoreError> {
    let file = File::open(path).map_err(|e| RestoreError::BadManifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| RestoreError::BadManifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
