//! Cross-platform filesystem wrapper.
//!
//! On Unix the helpers below apply real POSIX permission bits and timestamps;
//! on other platforms they degrade to no-ops so that call-sites stay identical
//! across OSes. The extractor relies on these to sanitize whatever mode and
//! mtime an untrusted archive declares before a file becomes visible.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

/// Permission bits a regular file falls back to when the archive declares none.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Permission bits a directory falls back to when the archive declares none.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op off Unix: POSIX permission bits are not preserved.
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Reduce an archive-declared file mode to plain permission bits,
/// substituting a safe default when the archive declares nothing.
pub fn sanitized_file_mode(declared: u32) -> u32 {
    let bits = declared & 0o7777;
    if bits == 0 {
        DEFAULT_FILE_MODE
    } else {
        bits
    }
}

/// Same reduction for directory modes.
pub fn sanitized_dir_mode(declared: u32) -> u32 {
    let bits = declared & 0o777;
    if bits == 0 {
        DEFAULT_DIR_MODE
    } else {
        bits
    }
}

#[cfg(unix)]
/// Clear set-uid and set-gid bits on an already-written file.
///
/// Runs unconditionally after every file write during extraction; an archive
/// must never be able to plant a privilege-escalation payload.
pub fn strip_special_bits(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode();
    let cleared = mode & !0o6000;
    if cleared != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(cleared))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn strip_special_bits(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Apply a modification time to a file, using it for both atime and mtime
/// since archives and manifests only record mtime.
pub fn set_file_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    let times = fs::FileTimes::new().set_accessed(mtime).set_modified(mtime);
    file.set_times(times)
}

/// Count regular files below `root`. Used for the post-restore summary.
pub fn count_files(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count() as u64
}
