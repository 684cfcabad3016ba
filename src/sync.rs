use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use filetime::FileTime;
use log::{debug, info};

use crate::config::SyncConfig;
use crate::core::EmptyResult;
use crate::runner::CommandRunner;

const AUTOMOUNT_WAIT_TIME: Duration = Duration::from_secs(15);

/// Mirrors the backup target to the configured sync target.
pub fn sync(
    config: &SyncConfig, target_root: &str, runner: &dyn CommandRunner, dry_run: bool,
) -> EmptyResult {
    info!("Syncing the backups to {:?}...", config.target);

    if let Some(touch_file) = config.touch_file.as_deref() {
        if !dry_run {
            touch(touch_file)?;
        }
    }

    // No --delete: deletions on our side must never propagate to the mirror
    runner.execute(&[
        "rsync".to_owned(), "--archive".to_owned(),
        format!("{}/", target_root),
        config.target.clone(),
    ])
}

// Touching a file on the target filesystem gives automounted mounts a chance
// to come up before rsync starts. A missing file means the automounter
// hasn't responded yet: wait for it and proceed anyway.
fn touch(path: &str) -> EmptyResult {
    debug!("Touching {:?}...", path);

    match filetime::set_file_mtime(path, FileTime::now()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{:?} doesn't exist yet. Waiting for the automounter...", path);
            thread::sleep(AUTOMOUNT_WAIT_TIME);
            Ok(())
        },
        Err(err) => Err!("Unable to touch {:?}: {}", path, err),
    }
}
