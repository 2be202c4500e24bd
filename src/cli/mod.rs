use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Restore the newest matching archive into a destination with an atomic swap.
    #[command(alias = "r")]
    Restore {
        /// Directory holding the backup archives.
        #[arg(long)]
        backup_dir: PathBuf,

        /// Regular expression the backup file name must match.
        #[arg(long, default_value = r"\.tar(\.(gz|zst|xz))?$")]
        pattern: String,

        /// The directory to be replaced by the restored tree.
        #[arg(long)]
        dest: PathBuf,

        /// SHA-256 side-file ("<hex>  <filename>") to verify the archive against before restoring.
        #[arg(long)]
        checksum: Option<PathBuf>,

        /// Abort if the archive declares more regular files than this.
        #[arg(long)]
        max_files: Option<u64>,

        /// Abort if the archive declares more cumulative bytes than this.
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Permit pax/extended header members. They are skipped, never written to disk.
        #[arg(long)]
        allow_pax: bool,

        /// Do not reject sparse members outright. They remain unsupported either way.
        #[arg(long)]
        allow_sparse: bool,

        /// Validate the whole archive without touching the destination.
        #[arg(long)]
        dry_run: bool,

        /// Lock file guarding this destination. Defaults to a `<dest>.pid` sibling.
        #[arg(long)]
        lock_file: Option<PathBuf>,

        /// Seconds before an orphaned lock file may be reclaimed.
        #[arg(long, default_value_t = 3600)]
        stale_after: u64,
    },

    /// Restore a content-addressed snapshot described by a manifest.
    #[command(alias = "s")]
    Snapshot {
        /// Manifest file inside the vault (objects live at `<vault>/objects`).
        #[arg(long)]
        manifest: PathBuf,

        /// The directory to restore the snapshot into.
        #[arg(long)]
        dest: PathBuf,

        /// Lock file guarding this destination. Defaults to a `<dest>.pid` sibling.
        #[arg(long)]
        lock_file: Option<PathBuf>,

        /// Seconds before an orphaned lock file may be reclaimed.
        #[arg(long, default_value_t = 3600)]
        stale_after: u64,
    },
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
