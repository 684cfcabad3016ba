use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::Deserialize;
use validator::Validate;

use crate::core::{EmptyResult, GenericResult};

#[derive(Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(skip)]
    pub path: String,
    #[validate(nested)]
    pub backups: Vec<BackupConfig>,
}

#[derive(Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub source: SourceConfig,

    /// Backups are placed into per-month directories under this path. The
    /// directory must exist: it's usually a mount point, so creating it
    /// automatically would silently back up into the local filesystem.
    pub target: String,

    /// Each archive name starts with this prefix. For readability of the
    /// resulting file names it should end with a hyphen or an underscore.
    #[validate(length(min = 1))]
    pub archive_prefix: String,

    /// Subdirectories of the source root to restrict the backup to. An empty
    /// list means no restriction — everything is backed up.
    #[serde(default)]
    pub subdirs: Vec<String>,

    /// Directories bind-mounted from the live filesystem to the same paths
    /// inside the snapshot mount tree, so that for example /boot living on a
    /// plain partition gets included into a backup of an LVM root.
    #[serde(default)]
    pub bind_mounts: Vec<String>,

    #[validate(nested)]
    pub sync: Option<SyncConfig>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    #[serde(rename = "lvm")]
    Lvm(LvmSourceConfig),

    #[serde(rename = "directory")]
    Directory {root: String},
}

#[derive(Deserialize)]
pub struct LvmSourceConfig {
    pub volume_group: String,
    pub logical_volume: String,

    /// The name to give the backup snapshot volume
    pub snapshot_name: String,

    /// Snapshot space size in volume manager syntax, for example `2G`
    pub snapshot_size: String,

    /// Where to mount the snapshot for the duration of the backup. The
    /// directory must exist.
    pub mount_point: String,
}

#[derive(Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// The directory to mirror the backup target to. rsync is invoked
    /// without --delete, so accidental deletions on the source side are
    /// never propagated to the mirror.
    pub target: String,

    /// A file to touch before the sync to give automounted filesystems a
    /// chance to come up.
    pub touch_file: Option<String>,

    /// Mirror even when the backup itself has failed, so that previously
    /// made backups still propagate.
    #[serde(default)]
    pub sync_on_failure: bool,
}

impl Config {
    pub fn load(path: &str) -> GenericResult<Config> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let mut config: Config = serde_yaml::from_slice(&data)?;
        config.path = path.to_owned();
        config.validate()?;

        let mut backup_names = HashSet::new();

        for backup in config.backups.iter_mut() {
            if !backup_names.insert(backup.name.clone()) {
                return Err!("Duplicated backup name: {:?}", backup.name);
            }

            backup.target = validate_local_path(&backup.target)?;

            match backup.source {
                SourceConfig::Lvm(ref mut lvm) => {
                    lvm.mount_point = validate_local_path(&lvm.mount_point)?;
                    validate_snapshot_size(&lvm.snapshot_size)?;
                },
                SourceConfig::Directory {ref mut root} => {
                    *root = validate_local_path(root)?;

                    if !backup.bind_mounts.is_empty() {
                        return Err!(
                            "Bind mounts are only supported for snapshotted sources");
                    }
                },
            }

            for subdir in &backup.subdirs {
                if subdir.is_empty() || Path::new(subdir).is_absolute() {
                    return Err!("Invalid backup subdirectory: {:?}", subdir);
                }
            }

            for path in backup.bind_mounts.iter_mut() {
                *path = validate_path(path)?;
            }

            if let Some(sync) = backup.sync.as_mut() {
                if !sync.target.ends_with('/') {
                    sync.target.push('/');
                }

                if let Some(touch_file) = sync.touch_file.clone() {
                    sync.touch_file.replace(validate_local_path(&touch_file)?);
                }
            }
        }

        Ok(config)
    }

    pub fn get_backup(&self, name: &str) -> GenericResult<&BackupConfig> {
        for backup in &self.backups {
            if backup.name == name {
                return Ok(backup);
            }
        }

        Err!("{:?} backup is not specified in the configuration file", name)
    }
}

fn validate_path(path: &str) -> GenericResult<String> {
    let mut normalized_path = PathBuf::new();
    let mut path_components = Path::new(path).components();

    if path_components.next() != Some(Component::RootDir) {
        return Err!("Paths must be absolute");
    }
    normalized_path.push(Component::RootDir.as_os_str());

    for component in path_components {
        if let Component::Normal(component) = component {
            normalized_path.push(component);
        } else {
            return Err!("Invalid path: {}", path);
        }
    }

    Ok(normalized_path.to_str().unwrap().to_owned())
}

fn validate_local_path(path: &str) -> GenericResult<String> {
    validate_path(&shellexpand::tilde(path))
}

fn validate_snapshot_size(size: &str) -> EmptyResult {
    lazy_static! {
        static ref SIZE_RE: Regex = Regex::new(
            r"^[1-9]\d*[bBsSkKmMgGtTpPeE]?$").unwrap();
    }

    if !SIZE_RE.is_match(size) {
        return Err!("Invalid snapshot size specification: {:?}", size);
    }

    Ok(())
}
