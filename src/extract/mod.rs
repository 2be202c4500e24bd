//! # Atomic Extraction Module
//!
//! This module implements the extract-and-swap restore path: an untrusted
//! archive is streamed through the member policy into a private staging tree,
//! and the staging tree replaces the destination with rename operations so
//! that no external observer ever sees a partially-constructed tree.
//!
//! The swap protocol on an existing destination is:
//!
//! 1. rename `dest` -> `dest.old_<pid>_<ts>` (backup)
//! 2. rename `dest.new_<pid>_<ts>` (staging) -> `dest`
//! 3. best-effort removal of the backup
//!
//! If step 2 fails the backup is renamed straight back; if even that fails the
//! backup path is surfaced in the error and never silently discarded.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::codec;
use crate::common::CancelToken;
use crate::error::RestoreError;
use crate::fsx;
use crate::policy::{
    evaluate_member, ArchiveMember, MemberKind, MemberVerdict, RestorePolicy,
};

/// Counters reported back to the caller after a successful pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Accepted regular files.
    pub files: u64,
    /// Cumulative declared bytes of accepted regular files.
    pub bytes: u64,
}

/// Identity of one extractor invocation; staging and backup siblings are named
/// from it so that concurrent, differently-timestamped invocations never collide.
#[derive(Clone, Copy, Debug)]
struct Stamp {
    pid: u32,
    epoch: u64,
}

impl Stamp {
    fn now() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Stamp {
            pid: std::process::id(),
            epoch,
        }
    }
}

fn sibling_path(dest: &Path, tag: &str, stamp: Stamp) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "restore".to_string());
    dest.with_file_name(format!("{name}.{tag}_{}_{}", stamp.pid, stamp.epoch))
}

/// Map a tar entry type onto the policy's closed member classification.
fn classify(entry_type: tar::EntryType) -> MemberKind {
    use MemberKind as K;
    if entry_type.is_symlink() {
        K::Symlink
    } else if entry_type.is_hard_link() {
        K::Hardlink
    } else if entry_type.is_character_special() {
        K::CharDevice
    } else if entry_type.is_block_special() {
        K::BlockDevice
    } else if entry_type.is_fifo() {
        K::Fifo
    } else if entry_type.is_gnu_sparse() {
        K::Sparse
    } else if entry_type.is_pax_local_extensions() {
        K::ExtendedHeader
    } else if entry_type.is_pax_global_extensions() {
        K::GlobalExtendedHeader
    } else if entry_type.is_gnu_longname() || entry_type.is_gnu_longlink() {
        // metadata carriers for the following entry, same treatment as pax
        K::ExtendedHeader
    } else if entry_type.is_dir() {
        K::Directory
    } else if entry_type.is_file() {
        K::Regular
    } else {
        K::Unknown
    }
}

/// Restores one archive into one destination with atomic swap semantics.
///
/// Each instance owns its policy and working state; nothing is shared between
/// invocations, so independent restores can run in the same process without
/// cross-talk (the on-disk exclusivity lock still serializes restores that
/// target the same destination).
pub struct AtomicExtractor {
    policy: RestorePolicy,
}

impl AtomicExtractor {
    pub fn new(policy: RestorePolicy) -> Self {
        Self { policy }
    }

    /// Validate and extract `archive` into `dest`.
    ///
    /// Fails with `ArchiveNotFound` if the archive is missing, with
    /// `PolicyViolation` the moment any member is rejected, with
    /// `StagingConflict` if the deterministic staging directory already
    /// exists, and with a `Swap*` error if the final rename protocol fails.
    /// In dry-run mode every member is validated and counted but nothing is
    /// written and the destination is never touched.
    pub fn restore(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<ExtractReport, RestoreError> {
        self.restore_with_stamp(archive, dest, cancel, Stamp::now())
    }

    fn restore_with_stamp(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelToken,
        stamp: Stamp,
    ) -> Result<ExtractReport, RestoreError> {
        if !archive.exists() {
            return Err(RestoreError::ArchiveNotFound(archive.to_path_buf()));
        }

        let staging = sibling_path(dest, "new", stamp);
        if staging.exists() {
            return Err(RestoreError::StagingConflict(staging));
        }

        if self.policy.dry_run {
            info!("dry-run: validating archive {}", archive.display());
            let scratch = tempfile::tempdir()?;
            let report = self.stream_members(archive, scratch.path(), cancel);
            if let Err(e) = scratch.close() {
                debug!("failed to clean up dry-run tempdir: {e}");
            }
            return report;
        }

        create_private_dir(&staging).map_err(|e| RestoreError::io(e, &staging))?;
        // Covers every failure exit: a staging tree that was not swapped into
        // place is abandoned, never left beside the destination.
        let staging_guard = scopeguard::guard(staging.clone(), |p| {
            if p.exists() {
                if let Err(e) = fs::remove_dir_all(&p) {
                    debug!("failed to clean up staging dir {}: {e}", p.display());
                }
            }
        });

        let report = self.stream_members(archive, &staging, cancel)?;
        self.swap(dest, &staging, &sibling_path(dest, "old", stamp))?;

        drop(staging_guard);
        info!(
            "restored {} files ({} bytes) into {}",
            report.files,
            report.bytes,
            dest.display()
        );
        Ok(report)
    }

    /// Single pass over the archive. Dry-run and live extraction share this
    /// loop so that both apply identical member-acceptance logic; dry-run just
    /// points `staging` at a throwaway scratch root.
    fn stream_members(
        &self,
        archive_path: &Path,
        staging: &Path,
        cancel: &CancelToken,
    ) -> Result<ExtractReport, RestoreError> {
        let reader =
            codec::open_decoded(archive_path).map_err(|e| RestoreError::io(e, archive_path))?;
        let mut archive = tar::Archive::new(reader);

        let mut report = ExtractReport::default();
        for entry in archive
            .entries()
            .map_err(|e| RestoreError::io(e, archive_path))?
        {
            if cancel.is_cancelled() {
                return Err(RestoreError::Cancelled);
            }
            let mut entry = entry.map_err(|e| RestoreError::io(e, archive_path))?;
            let member = ArchiveMember {
                name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
                kind: classify(entry.header().entry_type()),
                size: entry.size(),
                mode: entry.header().mode().unwrap_or(0),
                mtime: entry.header().mtime().ok(),
            };

            match evaluate_member(&member, &self.policy) {
                MemberVerdict::Reject { reason } => {
                    return Err(RestoreError::PolicyViolation {
                        member: member.name,
                        reason,
                    });
                }
                MemberVerdict::Skip => {
                    debug!("skipping metadata member: {}", member.name);
                }
                MemberVerdict::MakeDir { path } => {
                    make_dir(staging, &path, member.mode)?;
                }
                MemberVerdict::WriteFile { path } => {
                    report.files += 1;
                    report.bytes += member.size;
                    if let Some(max) = self.policy.max_files {
                        if report.files > max {
                            return Err(RestoreError::MaxFilesExceeded);
                        }
                    }
                    if let Some(max) = self.policy.max_bytes {
                        if report.bytes > max {
                            return Err(RestoreError::MaxBytesExceeded);
                        }
                    }
                    write_file(staging, &path, &member, &mut entry)?;
                }
            }
        }
        Ok(report)
    }

    /// Make the staging tree live. The destination is fully the old state or
    /// fully the new state at every instant of this protocol.
    fn swap(&self, dest: &Path, staging: &Path, backup: &Path) -> Result<(), RestoreError> {
        if !dest.exists() {
            return fs::rename(staging, dest)
                .map_err(|source| RestoreError::SwapRolledBack { source });
        }

        fs::rename(dest, backup).map_err(|source| RestoreError::SwapRolledBack { source })?;

        if let Err(source) = fs::rename(staging, dest) {
            error!("failed during swap/rename: {source}");
            return match fs::rename(backup, dest) {
                Ok(()) => Err(RestoreError::SwapRolledBack { source }),
                Err(rollback_err) => {
                    error!(
                        "rollback failed ({rollback_err}); manual intervention required, backup left at {}",
                        backup.display()
                    );
                    Err(RestoreError::SwapAbandoned {
                        backup: backup.to_path_buf(),
                        source,
                    })
                }
            };
        }

        if let Err(e) = fs::remove_dir_all(backup) {
            warn!(
                "failed to remove backup directory {} (non-fatal): {e}",
                backup.display()
            );
        }
        Ok(())
    }
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().mode(0o700).create(path)
    }
    #[cfg(not(unix))]
    {
        fs::DirBuilder::new().create(path)
    }
}

fn make_dir(root: &Path, rel: &str, declared_mode: u32) -> Result<(), RestoreError> {
    let target = root.join(rel);
    fs::create_dir_all(&target).map_err(|e| RestoreError::io(e, &target))?;
    if let Err(e) = fsx::set_unix_permissions(&target, fsx::sanitized_dir_mode(declared_mode)) {
        debug!("failed to set mode on {} (non-fatal): {e}", target.display());
    }
    Ok(())
}

/// Write one accepted regular file: data goes to a `.tmp` sibling inside the
/// staging tree, metadata is applied and sanitized there, then the file moves
/// to its final name. A data-absent member is created empty rather than skipped.
fn write_file(
    root: &Path,
    rel: &str,
    member: &ArchiveMember,
    data: &mut impl Read,
) -> Result<(), RestoreError> {
    let final_path = root.join(rel);
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).map_err(|e| RestoreError::io(e, parent))?;
    }

    let tmp_path = root.join(format!("{rel}.tmp"));
    {
        let mut out = fs::File::create(&tmp_path).map_err(|e| RestoreError::io(e, &tmp_path))?;
        io::copy(data, &mut out).map_err(|e| RestoreError::io(e, &tmp_path))?;
    }

    if let Err(e) = fsx::set_unix_permissions(&tmp_path, fsx::sanitized_file_mode(member.mode)) {
        debug!("failed to set mode on {} (non-fatal): {e}", tmp_path.display());
    }
    if let Some(secs) = member.mtime {
        let mtime = UNIX_EPOCH + Duration::from_secs(secs);
        if let Err(e) = fsx::set_file_mtime(&tmp_path, mtime) {
            debug!("failed to set mtime on {} (non-fatal): {e}", tmp_path.display());
        }
    }
    if let Err(e) = fsx::strip_special_bits(&tmp_path) {
        debug!("failed to sanitize mode for {} (non-fatal): {e}", tmp_path.display());
    }

    fs::rename(&tmp_path, &final_path).map_err(|e| RestoreError::io(e, &final_path))
}
