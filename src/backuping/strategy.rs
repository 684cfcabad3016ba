use crate::config::BackupConfig;
use crate::core::GenericResult;

use super::ledger::Ledger;
use super::period::BackupPeriod;

const ARCHIVER: &str = "dar";

// Split the archive into slices that fit on ISO9660 DVDs
const SLICE_SIZE: &str = "1875000000";

// Don't compress files smaller than this size in bytes
const MIN_COMPRESSION_SIZE: &str = "150";

// Already compressed media and archive formats
const NO_COMPRESS_PATTERNS: &[&str] = &[
    "*.avi", "*.bz2", "*.gif", "*.gz", "*.jpg", "*.mov", "*.mpg", "*.mp3",
    "*.pbm", "*.pdf", "*.png", "*.Z", "*.zip",
];

/// The kind of backup to make, chosen once per run from the ledger state.
pub enum Strategy {
    Full,
    Incremental {parent: String},
}

impl Strategy {
    /// A backup is incremental if and only if the current period has a
    /// recorded last successful backup.
    pub fn select(ledger: &Ledger) -> Strategy {
        match ledger.last_successful() {
            Some(parent) => Strategy::Incremental {parent: parent.to_owned()},
            None => Strategy::Full,
        }
    }

    pub fn type_suffix(&self) -> &'static str {
        match self {
            Strategy::Full => "-FULL",
            Strategy::Incremental {..} => "-INC",
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            Strategy::Full => None,
            Strategy::Incremental {parent} => Some(parent),
        }
    }
}

/// Constructs the archiver command line. Both backup types share the same
/// base invocation; an incremental backup additionally references its parent
/// archive within the same period directory.
pub fn archiver_command(
    strategy: &Strategy, config: &BackupConfig, period: &BackupPeriod,
    archive_name: &str, source_root: &str,
) -> GenericResult<Vec<String>> {
    let mut command = vec![
        ARCHIVER.to_owned(),
        "-c".to_owned(), format!("{}/{}", period.path, archive_name),
        "-R".to_owned(), source_root.to_owned(),
        // Don't warn before overwriting a file or slice
        "-w".to_owned(),
        "-s".to_owned(), SLICE_SIZE.to_owned(),
        // Store excluded directories as empty
        "-D".to_owned(),
        // Maximum compression
        "-z9".to_owned(),
        "-m".to_owned(), MIN_COMPRESSION_SIZE.to_owned(),
    ];

    for pattern in NO_COMPRESS_PATTERNS {
        command.push("-Z".to_owned());
        command.push((*pattern).to_owned());
    }

    // No configured restriction means back up everything
    for subdir in &config.subdirs {
        command.push("-g".to_owned());
        command.push(subdir.clone());
    }

    if let Strategy::Incremental {parent} = strategy {
        if parent.is_empty() {
            return Err!("An attempt to make an incremental backup without a parent backup");
        }
        command.push("-A".to_owned());
        command.push(format!("{}/{}", period.path, parent));
    }

    Ok(command)
}
