//! Backup discovery: pick the newest archive whose name matches a pattern.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::debug;

/// Return the newest (by mtime) regular file in `dir` whose file name matches
/// `pattern`, or `None` when the directory is missing or nothing matches.
pub fn find_latest_backup(dir: &Path, pattern: &Regex) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!("cannot list backup dir {}: {e}", dir.display());
            return None;
        }
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if !pattern.is_match(&name.to_string_lossy()) {
            continue;
        }
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match &newest {
            Some((best, _)) if *best >= mtime => {}
            _ => newest = Some((mtime, path)),
        }
    }
    newest.map(|(_, path)| path)
}
