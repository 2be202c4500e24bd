//! SHA-256 side-file verification.
//!
//! A backup archive may ship with a text side-file of the form
//! `"<hex-sha256>  <filename>"`. The restore only needs the boolean outcome:
//! verified or not. Any read problem counts as "not verified".

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

/// Compute the hex SHA-256 digest of a file, streaming.
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify `target` against the digest recorded in `side_file`.
///
/// The expected digest is the first whitespace-separated token of the first
/// non-empty line. Returns `false` on mismatch, an empty side-file, or any
/// read failure.
pub fn verify_sha256_from_file(target: &Path, side_file: &Path) -> bool {
    let recorded = match std::fs::read_to_string(side_file) {
        Ok(text) => text,
        Err(e) => {
            warn!("could not read checksum file {}: {e}", side_file.display());
            return false;
        }
    };
    let expected = match recorded
        .lines()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().next())
    {
        Some(tok) => tok.to_ascii_lowercase(),
        None => {
            warn!("checksum file {} is empty", side_file.display());
            return false;
        }
    };

    match compute_sha256(target) {
        Ok(actual) => actual == expected,
        Err(e) => {
            warn!("could not hash {}: {e}", target.display());
            false
        }
    }
}
