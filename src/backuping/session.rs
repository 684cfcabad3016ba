use chrono::{DateTime, Local};
use log::{debug, info};

use crate::config::{BackupConfig, SourceConfig};
use crate::core::{EmptyResult, GenericResult};
use crate::runner::CommandRunner;

use super::ledger::Ledger;
use super::period::BackupPeriod;
use super::snapshot::SnapshotLifecycle;
use super::strategy::{self, Strategy};

/// One backup run: owns the period directory, the archive naming scheme and
/// the ledger state loaded at session start.
pub struct BackupSession<'a> {
    config: &'a BackupConfig,
    runner: &'a dyn CommandRunner,
    period: BackupPeriod,
    ledger: Ledger,
    start_time: DateTime<Local>,
}

impl<'a> BackupSession<'a> {
    pub fn new(
        config: &'a BackupConfig, runner: &'a dyn CommandRunner,
        start_time: DateTime<Local>, dry_run: bool,
    ) -> GenericResult<BackupSession<'a>> {
        let period = BackupPeriod::ensure(&config.target, start_time)?;
        let ledger = Ledger::load(&period, dry_run)?;
        Ok(BackupSession {config, runner, period, ledger, start_time})
    }

    /// Runs the backup and returns the name of the created archive.
    pub fn run(&self) -> GenericResult<String> {
        debug!("Using {:?} backup period at {:?}.", self.period.name, self.period.path);

        let strategy = Strategy::select(&self.ledger);
        let archive_name = self.archive_name(&strategy);

        match strategy.parent() {
            Some(parent) => info!("Making {:?} incremental backup based on {:?}...",
                                  archive_name, parent),
            None => info!("Making {:?} full backup...", archive_name),
        }

        match self.config.source {
            SourceConfig::Lvm(ref lvm) => {
                let mut snapshot = SnapshotLifecycle::new(
                    lvm, &self.config.bind_mounts, self.runner);

                // Cleanup must run whether the backup step succeeded or not,
                // and its result never replaces the backup result
                let result = snapshot.prepare().and_then(|source_root| {
                    self.archive(&strategy, &archive_name, &source_root)
                });
                snapshot.cleanup();
                result?;
            },
            SourceConfig::Directory {ref root} => {
                self.archive(&strategy, &archive_name, root)?;
            },
        }

        info!("Successfully created {:?} backup.", archive_name);
        Ok(archive_name)
    }

    /// Configured prefix plus the session start time at minute resolution
    /// plus the backup type suffix. Runs within the same minute produce the
    /// same name and silently overwrite each other's state.
    fn archive_name(&self, strategy: &Strategy) -> String {
        format!("{}{}{}",
            self.config.archive_prefix,
            self.start_time.format("%Y-%m-%dT%H%M"),
            strategy.type_suffix())
    }

    fn archive(&self, strategy: &Strategy, archive_name: &str, source_root: &str) -> EmptyResult {
        let command = strategy::archiver_command(
            strategy, self.config, &self.period, archive_name, source_root)?;

        self.runner.execute(&command)?;

        // The ledger is updated strictly after the archiver reported
        // success, so the dependency chain never references an archive that
        // doesn't exist on disk
        self.ledger.record_success(archive_name, strategy.parent().unwrap_or(""))
    }
}
