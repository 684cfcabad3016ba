use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};

use log::debug;

use crate::core::{EmptyResult, GenericResult};

use super::period::BackupPeriod;

pub const LAST_SUCCESSFUL_FILE_NAME: &str = "latest_successful";
pub const DEPS_FILE_NAME: &str = "backup_deps";

/// Per-period record of the last successful backup plus the append-only
/// parent/child dependency log.
///
/// The marker file is read once when the ledger is loaded and the result is
/// kept for the whole session, so a concurrent modification of the file
/// can't change the full/incremental decision mid-run.
pub struct Ledger {
    marker_path: String,
    deps_path: String,
    last_successful: Option<String>,
    dry_run: bool,
}

impl Ledger {
    pub fn load(period: &BackupPeriod, dry_run: bool) -> GenericResult<Ledger> {
        let marker_path = format!("{}/{}", period.path, LAST_SUCCESSFUL_FILE_NAME);
        let deps_path = format!("{}/{}", period.path, DEPS_FILE_NAME);

        let last_successful = match fs::read_to_string(&marker_path) {
            Ok(data) => {
                let name = data.lines().next().unwrap_or("").trim().to_owned();
                if name.is_empty() {
                    debug!("{:?} is empty: no prior successful backup.", marker_path);
                    None
                } else {
                    debug!("Last successful backup: {:?}.", name);
                    Some(name)
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{:?} doesn't exist: no prior successful backup.", marker_path);
                None
            },
            Err(err) => return Err!("Unable to read {:?}: {}", marker_path, err),
        };

        Ok(Ledger {marker_path, deps_path, last_successful, dry_run})
    }

    pub fn last_successful(&self) -> Option<&str> {
        self.last_successful.as_deref()
    }

    /// Records a newly finished backup. Must be called only after the
    /// archiver has reported success: the dependency chain must never
    /// reference an archive that doesn't exist on disk.
    pub fn record_success(&self, name: &str, parent: &str) -> EmptyResult {
        debug!("Setting the last successful backup in {:?} to {:?}...", self.marker_path, name);
        if !self.dry_run {
            fs::write(&self.marker_path, format!("{}\n", name)).map_err(|e| format!(
                "Unable to write {:?}: {}", self.marker_path, e))?;
        }

        debug!("Logging backup dependency to {:?}...", self.deps_path);
        if !self.dry_run {
            let mut deps = OpenOptions::new().create(true).append(true)
                .open(&self.deps_path).map_err(|e| format!(
                    "Unable to open {:?}: {}", self.deps_path, e))?;

            writeln!(deps, "{}:{}", name, parent).map_err(|e| format!(
                "Unable to write {:?}: {}", self.deps_path, e))?;
        }

        Ok(())
    }
}
