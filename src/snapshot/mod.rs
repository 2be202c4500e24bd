//! Snapshot restoration from a content-addressed vault.
//!
//! Walks a versioned manifest and materializes each file from the object
//! store. Unlike the archive path, this restore is best-effort per entry: a
//! snapshot spans thousands of independent files, so one missing object or
//! unreadable target must not abort the rest. Per-entry failures are counted
//! and reported; only a broken manifest, a missing store, or a vault overlap
//! aborts the whole operation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::common::{CancelToken, RestoreSummary};
use crate::error::RestoreError;
use crate::fsx;
use crate::manifest::{self, ManifestEntry};
use crate::policy::sanitize_member_name;
use crate::store::ObjectStore;

fn absolutize(path: &Path) -> Result<PathBuf, RestoreError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()
            .map_err(|e| RestoreError::io(e, path))?
            .join(path))
    }
}

/// Restore the snapshot described by `manifest_path` into `dest`.
///
/// The vault layout is `<vault>/<manifests-dir>/<manifest>` with objects at
/// `<vault>/objects`. The destination must not overlap the vault in either
/// direction; restoring a vault into itself would corrupt the backing store.
pub fn restore_snapshot(
    manifest_path: &Path,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<RestoreSummary, RestoreError> {
    let abs_manifest = absolutize(manifest_path)?;
    let abs_dest = absolutize(dest)?;
    let manifest_dir = abs_manifest.parent().unwrap_or(Path::new("/"));
    let vault_root = manifest_dir.parent().unwrap_or(Path::new("/"));

    if abs_dest.starts_with(vault_root) || vault_root.starts_with(&abs_dest) {
        return Err(RestoreError::VaultOverlap {
            dest: abs_dest,
            vault: vault_root.to_path_buf(),
        });
    }

    info!("loading manifest from {}", abs_manifest.display());
    let manifest = manifest::load_manifest(&abs_manifest)?;
    info!("snapshot version: {}", manifest.version);

    let store = ObjectStore::open(vault_root.join("objects"))?;

    info!("restoring to {}", abs_dest.display());
    fs::create_dir_all(&abs_dest).map_err(|e| RestoreError::io(e, &abs_dest))?;

    let mut summary = RestoreSummary::default();
    for (rel_path, entry) in &manifest.files {
        if cancel.is_cancelled() {
            info!(
                "cancelled after {} restored, {} skipped",
                summary.restored, summary.skipped
            );
            return Err(RestoreError::Cancelled);
        }

        // Same intent as archive member sanitization, minus the permissive
        // absolute-path stripping: a manifest key must already be relative.
        let safe_rel = if Path::new(rel_path).is_absolute() {
            None
        } else {
            sanitize_member_name(rel_path).filter(|p| !p.is_empty())
        };
        let safe_rel = match safe_rel {
            Some(p) => p,
            None => {
                warn!("skipping unsafe path '{rel_path}'");
                summary.skipped += 1;
                continue;
            }
        };

        let hash = entry.hash();
        if !store.contains(hash) {
            error!("missing object {hash} for file {rel_path}");
            summary.skipped += 1;
            continue;
        }

        let target = abs_dest.join(&safe_rel);
        if let Err(e) = store.restore_object(hash, &target) {
            error!("failed to restore {rel_path}: {e}");
            summary.skipped += 1;
            continue;
        }

        // Content is on disk; metadata application is best-effort and never
        // demotes the entry to skipped.
        apply_entry_metadata(entry, &target, rel_path);

        debug!("restoring: {rel_path}");
        summary.restored += 1;
    }

    info!(
        "restore complete. restored: {}, skipped/failed: {}",
        summary.restored, summary.skipped
    );
    Ok(summary)
}

fn apply_entry_metadata(entry: &ManifestEntry, target: &Path, rel_path: &str) {
    if let Some(mode) = entry.mode() {
        if let Err(e) = fsx::set_unix_permissions(target, mode & 0o7777) {
            warn!("failed to apply mode for {rel_path}: {e}");
        }
    }
    if let Some(mtime) = entry.mtime() {
        if mtime.is_finite() && mtime >= 0.0 {
            let when = UNIX_EPOCH + Duration::from_secs_f64(mtime);
            if let Err(e) = fsx::set_file_mtime(target, when) {
                warn!("failed to apply mtime for {rel_path}: {e}");
            }
        } else {
            warn!("ignoring out-of-range mtime {mtime} for {rel_path}");
        }
    }
}
