//! Main entry point for the revault CLI app

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use revault::cli::{self, Commands};
use revault::common::CancelToken;
use revault::extract::AtomicExtractor;
use revault::lock::PidLock;
use revault::policy::RestorePolicy;
use revault::{checksum, fsx, locate, snapshot, RestoreError};

/// Distinct exit code for lock contention so supervisors can tell "another
/// restore is already running" apart from a real failure.
const EXIT_LOCKED: u8 = 3;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run_app() {
        eprintln!("Error: {e}");
        if let Some(RestoreError::LockContention(_)) = e.downcast_ref::<RestoreError>() {
            return ExitCode::from(EXIT_LOCKED);
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;

    // The engine only consumes the token between units of work; wiring it to a
    // signal handler is the embedder's concern, not the core's.
    let cancel = CancelToken::new();

    match command {
        Commands::Restore {
            backup_dir,
            pattern,
            dest,
            checksum: checksum_file,
            max_files,
            max_bytes,
            allow_pax,
            allow_sparse,
            dry_run,
            lock_file,
            stale_after,
        } => {
            if !backup_dir.is_dir() {
                return Err(
                    format!("backup directory '{}' does not exist", backup_dir.display()).into(),
                );
            }
            let pattern = Regex::new(&pattern)?;
            let archive = locate::find_latest_backup(&backup_dir, &pattern)
                .ok_or("no matching backup found")?;
            info!("selected backup {}", archive.display());

            if let Some(side_file) = checksum_file {
                if !checksum::verify_sha256_from_file(&archive, &side_file) {
                    return Err(format!("checksum mismatch for {}", archive.display()).into());
                }
                info!("checksum verified");
            }

            let lock_path = lock_file.unwrap_or_else(|| default_lock_path(&dest));
            let lock = PidLock::acquire(&lock_path, Duration::from_secs(stale_after))?;

            let policy = RestorePolicy {
                max_files,
                max_bytes,
                allow_extended_headers: allow_pax,
                reject_sparse: !allow_sparse,
                dry_run,
            };
            let result = AtomicExtractor::new(policy).restore(&archive, &dest, &cancel);
            lock.release();
            let report = result?;

            if dry_run {
                println!(
                    "Dry-run OK: {} files, {} bytes declared",
                    report.files, report.bytes
                );
            } else {
                println!("Restore complete: {} files on disk", fsx::count_files(&dest));
            }
        }

        Commands::Snapshot {
            manifest,
            dest,
            lock_file,
            stale_after,
        } => {
            let lock_path = lock_file.unwrap_or_else(|| default_lock_path(&dest));
            let lock = PidLock::acquire(&lock_path, Duration::from_secs(stale_after))?;

            let result = snapshot::restore_snapshot(&manifest, &dest, &cancel);
            lock.release();
            let summary = result?;

            println!(
                "Restore complete. Restored: {}, Skipped: {}",
                summary.restored, summary.skipped
            );
        }
    }

    Ok(())
}

fn default_lock_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "restore".to_string());
    dest.with_file_name(format!("{name}.pid"))
}
