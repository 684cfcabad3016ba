use log::{error, info};

use crate::config::LvmSourceConfig;
use crate::core::{EmptyResult, GenericResult};
use crate::runner::CommandRunner;

/// Owns the volume snapshot for the duration of one backup run: creates it,
/// mounts it, attaches the configured bind mounts and tears everything down
/// again in reverse order.
///
/// Each completed prepare step records its teardown action, so cleanup()
/// undoes exactly what has been set up no matter which later step failed.
pub struct SnapshotLifecycle<'a> {
    lvm: &'a LvmSourceConfig,
    bind_mounts: &'a [String],
    runner: &'a dyn CommandRunner,
    teardown: Vec<Teardown>,
}

enum Teardown {
    UnmountBind(String),
    UnmountSnapshot,
    RemoveSnapshot,
}

impl<'a> SnapshotLifecycle<'a> {
    pub fn new(
        lvm: &'a LvmSourceConfig, bind_mounts: &'a [String], runner: &'a dyn CommandRunner,
    ) -> SnapshotLifecycle<'a> {
        SnapshotLifecycle {lvm, bind_mounts, runner, teardown: Vec::new()}
    }

    /// Prepares the snapshot tree and returns the path to back up. A failed
    /// step aborts the remaining steps; the already completed ones stay
    /// recorded for cleanup().
    pub fn prepare(&mut self) -> GenericResult<String> {
        let lvm = self.lvm;

        info!("Creating {:?} snapshot of {}/{}...",
              lvm.snapshot_name, lvm.volume_group, lvm.logical_volume);

        self.runner.execute(&[
            "lvcreate".to_owned(), "--snapshot".to_owned(),
            "--size".to_owned(), lvm.snapshot_size.clone(),
            "--name".to_owned(), lvm.snapshot_name.clone(),
            format!("{}/{}", lvm.volume_group, lvm.logical_volume),
        ]).map_err(|e| format!("Unable to create the snapshot: {}", e))?;
        self.teardown.push(Teardown::RemoveSnapshot);

        info!("Mounting the snapshot at {:?}...", lvm.mount_point);

        self.runner.execute(&[
            "mount".to_owned(),
            format!("/dev/{}/{}", lvm.volume_group, lvm.snapshot_name),
            lvm.mount_point.clone(),
        ]).map_err(|e| format!("Unable to mount the snapshot: {}", e))?;
        self.teardown.push(Teardown::UnmountSnapshot);

        for path in self.bind_mounts {
            info!("Attaching {:?} bind mount...", path);

            let mount_path = format!("{}{}", lvm.mount_point, path);
            self.runner.execute(&[
                "mount".to_owned(), "--bind".to_owned(), path.clone(), mount_path.clone(),
            ]).map_err(|e| format!("Unable to bind mount {:?}: {}", path, e))?;
            self.teardown.push(Teardown::UnmountBind(mount_path));
        }

        Ok(lvm.mount_point.clone())
    }

    /// Tears down everything prepare() has set up, in reverse order and
    /// exactly once. Teardown errors are logged and don't interrupt the
    /// remaining steps, so a cleanup failure never masks the error that
    /// triggered the cleanup.
    pub fn cleanup(&mut self) {
        for step in std::mem::take(&mut self.teardown).into_iter().rev() {
            if let Err(err) = self.run_teardown(&step) {
                error!("Cleanup failed: {}.", err);
            }
        }
    }

    fn run_teardown(&self, step: &Teardown) -> EmptyResult {
        let lvm = self.lvm;

        match step {
            Teardown::UnmountBind(path) => {
                self.runner.execute(&["umount".to_owned(), path.clone()]).map_err(|e| format!(
                    "Unable to unmount {:?}: {}", path, e).into())
            },
            Teardown::UnmountSnapshot => {
                self.runner.execute(&["umount".to_owned(), lvm.mount_point.clone()])
                    .map_err(|e| format!("Unable to unmount the snapshot: {}", e).into())
            },
            Teardown::RemoveSnapshot => {
                self.runner.execute(&[
                    "lvremove".to_owned(), "--force".to_owned(),
                    format!("{}/{}", lvm.volume_group, lvm.snapshot_name),
                ]).map_err(|e| format!("Unable to remove the snapshot: {}", e).into())
            },
        }
    }
}
