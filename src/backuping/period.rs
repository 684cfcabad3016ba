use std::fs;
use std::io::ErrorKind;

use chrono::{DateTime, Local};
use log::{debug, info};

use crate::core::GenericResult;

/// A time-bucketed backup set: one directory per calendar month under the
/// backup target root. Created lazily on the first backup of the month and
/// never deleted.
#[derive(Debug)]
pub struct BackupPeriod {
    pub name: String,
    pub path: String,
}

impl BackupPeriod {
    pub fn ensure(target_root: &str, time: DateTime<Local>) -> GenericResult<BackupPeriod> {
        let name = time.format("%Y-%m").to_string();
        let path = format!("{}/{}", target_root, name);

        match fs::create_dir(&path) {
            Ok(()) => info!("Created {:?} backup period directory.", path),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("{:?} backup period directory already exists.", path);
            },
            Err(err) => return Err!("Unable to create {:?}: {}", path, err),
        }

        Ok(BackupPeriod {name, path})
    }
}
