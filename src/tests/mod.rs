use std::cell::RefCell;
use std::fs;

use assert_fs::TempDir;
use chrono::{DateTime, Local, TimeZone};

use crate::backuping::{BackupSession, DEPS_FILE_NAME, LAST_SUCCESSFUL_FILE_NAME};
use crate::config::{BackupConfig, LvmSourceConfig, SourceConfig};
use crate::core::{EmptyResult, GenericResult};
use crate::runner::{format_command, CommandRunner, SystemRunner};

#[test]
fn full_then_incremental() -> EmptyResult {
    let temp_dir = TempDir::new()?;
    let config = new_directory_config(&temp_dir)?;
    let period_path = format!("{}/2024-03", config.target);

    let runner = ScriptedRunner::new();

    // The period has no prior successful backup, so the first run is full
    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    assert_eq!(session.run()?, "host-2024-03-02T1000-FULL");

    assert_eq!(read_ledger_file(&period_path, LAST_SUCCESSFUL_FILE_NAME),
               "host-2024-03-02T1000-FULL\n");
    assert_eq!(read_ledger_file(&period_path, DEPS_FILE_NAME),
               "host-2024-03-02T1000-FULL:\n");

    {
        let commands = runner.commands();
        assert_eq!(commands.len(), 1);

        let command = &commands[0];
        assert_eq!(command[0], "dar");
        assert_eq!(&command[1..5], [
            s!("-c"), format!("{}/host-2024-03-02T1000-FULL", period_path),
            s!("-R"), config_source_root(&config),
        ]);
        assert!(!command.contains(&s!("-A")));
        assert!(!command.contains(&s!("-g")));
    }

    // The second run in the same period must be incremental and reference
    // exactly the recorded parent
    let session = BackupSession::new(&config, &runner, time(2024, 3, 15, 9, 0), false)?;
    assert_eq!(session.run()?, "host-2024-03-15T0900-INC");

    assert_eq!(read_ledger_file(&period_path, LAST_SUCCESSFUL_FILE_NAME),
               "host-2024-03-15T0900-INC\n");
    assert_eq!(read_ledger_file(&period_path, DEPS_FILE_NAME),
               "host-2024-03-02T1000-FULL:\nhost-2024-03-15T0900-INC:host-2024-03-02T1000-FULL\n");

    let command = runner.commands().pop().unwrap();
    assert_eq!(&command[command.len() - 2..], [
        s!("-A"), format!("{}/host-2024-03-02T1000-FULL", period_path),
    ]);

    Ok(())
}

#[test]
fn snapshotted_backup_flow() -> EmptyResult {
    let temp_dir = TempDir::new()?;
    let config = new_lvm_config(&temp_dir)?;
    let period_path = format!("{}/2024-03", config.target);

    let runner = ScriptedRunner::new();
    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    session.run()?;

    let command_lines = runner.command_lines();
    assert_eq!(command_lines.len(), 7);

    assert_eq!(command_lines[0], "lvcreate --snapshot --size 2G --name root-backup-snap data/root");
    assert_eq!(command_lines[1], "mount /dev/data/root-backup-snap /mnt/backup-snapshot");
    assert_eq!(command_lines[2], "mount --bind /boot /mnt/backup-snapshot/boot");

    assert!(command_lines[3].starts_with(&format!(
        "dar -c {}/host-2024-03-02T1000-FULL -R /mnt/backup-snapshot ", period_path)));

    assert_eq!(command_lines[4..], [
        s!("umount /mnt/backup-snapshot/boot"),
        s!("umount /mnt/backup-snapshot"),
        s!("lvremove --force data/root-backup-snap"),
    ]);

    Ok(())
}

#[test]
fn failed_backup_doesnt_touch_the_ledger() -> EmptyResult {
    let temp_dir = TempDir::new()?;
    let config = new_lvm_config(&temp_dir)?;
    let period_path = format!("{}/2024-03", config.target);

    let runner = ScriptedRunner::new();
    runner.fail_on("dar");
    runner.fail_on("umount /mnt/backup-snapshot/boot");

    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    let error = session.run().unwrap_err().to_string();

    // The archiver failure is what the caller observes, not the injected
    // cleanup failure
    assert!(error.starts_with("Scripted failure for: dar"), "{}", error);

    assert!(!fs::exists(format!("{}/{}", period_path, LAST_SUCCESSFUL_FILE_NAME))?);
    assert!(!fs::exists(format!("{}/{}", period_path, DEPS_FILE_NAME))?);

    // Teardown still ran to completion past the failed unbind
    let command_lines = runner.command_lines();
    assert_eq!(command_lines[command_lines.len() - 3..], [
        s!("umount /mnt/backup-snapshot/boot"),
        s!("umount /mnt/backup-snapshot"),
        s!("lvremove --force data/root-backup-snap"),
    ]);

    // The next run still sees a fresh period
    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 11, 0), false)?;
    let error = session.run().unwrap_err().to_string();
    assert!(error.contains("host-2024-03-02T1100-FULL"), "{}", error);

    Ok(())
}

// Archive names have minute resolution with no collision check: a manual
// re-run within the same minute reuses the identifier and overwrites the
// previous run's state. An accepted boundary case, not a bug.
#[test]
fn same_minute_rerun_reuses_identifier() -> EmptyResult {
    let temp_dir = TempDir::new()?;
    let config = new_directory_config(&temp_dir)?;
    let period_path = format!("{}/2024-03", config.target);

    let runner = ScriptedRunner::new();

    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    session.run()?;

    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    let first_incremental = session.run()?;

    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), false)?;
    let second_incremental = session.run()?;

    assert_eq!(first_incremental, second_incremental);
    assert_eq!(read_ledger_file(&period_path, DEPS_FILE_NAME).lines().last().unwrap(), format!(
        "{}:{}", second_incremental, first_incremental));

    Ok(())
}

#[test]
fn dry_run_mutates_nothing() -> EmptyResult {
    let temp_dir = TempDir::new()?;
    let config = new_lvm_config(&temp_dir)?;
    let period_path = format!("{}/2024-03", config.target);

    // A real runner: in dry-run mode it must not spawn anything, which is
    // also what allows this test to "run" lvcreate
    let runner = SystemRunner::new(true);

    let session = BackupSession::new(&config, &runner, time(2024, 3, 2, 10, 0), true)?;
    assert_eq!(session.run()?, "host-2024-03-02T1000-FULL");

    assert!(fs::metadata(&period_path)?.is_dir());
    assert!(!fs::exists(format!("{}/{}", period_path, LAST_SUCCESSFUL_FILE_NAME))?);
    assert!(!fs::exists(format!("{}/{}", period_path, DEPS_FILE_NAME))?);

    Ok(())
}

fn time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

fn new_directory_config(temp_dir: &TempDir) -> GenericResult<BackupConfig> {
    let target = temp_dir.path().join("backups");
    fs::create_dir(&target)?;

    Ok(BackupConfig {
        name: s!("os"),
        source: SourceConfig::Directory {
            root: temp_dir.path().to_str().unwrap().to_owned(),
        },
        target: target.to_str().unwrap().to_owned(),
        archive_prefix: s!("host-"),
        subdirs: Vec::new(),
        bind_mounts: Vec::new(),
        sync: None,
    })
}

fn new_lvm_config(temp_dir: &TempDir) -> GenericResult<BackupConfig> {
    let mut config = new_directory_config(temp_dir)?;

    config.source = SourceConfig::Lvm(LvmSourceConfig {
        volume_group: s!("data"),
        logical_volume: s!("root"),
        snapshot_name: s!("root-backup-snap"),
        snapshot_size: s!("2G"),
        mount_point: s!("/mnt/backup-snapshot"),
    });
    config.bind_mounts = vec![s!("/boot")];

    Ok(config)
}

fn config_source_root(config: &BackupConfig) -> String {
    match config.source {
        SourceConfig::Directory {ref root} => root.clone(),
        SourceConfig::Lvm(ref lvm) => lvm.mount_point.clone(),
    }
}

fn read_ledger_file(period_path: &str, name: &str) -> String {
    fs::read_to_string(format!("{}/{}", period_path, name)).unwrap()
}

/// Records every command it's asked to execute and fails the ones matching
/// the scripted failure patterns.
pub struct ScriptedRunner {
    commands: RefCell<Vec<Vec<String>>>,
    failures: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> ScriptedRunner {
        ScriptedRunner {
            commands: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
        }
    }

    /// Makes commands whose command line starts with the specified prefix
    /// fail.
    pub fn fail_on(&self, prefix: &str) {
        self.failures.borrow_mut().push(prefix.to_owned());
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands.borrow().iter().map(|command| format_command(command)).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn execute(&self, command: &[String]) -> EmptyResult {
        self.commands.borrow_mut().push(command.to_vec());

        let command_line = format_command(command);
        for prefix in self.failures.borrow().iter() {
            if command_line.starts_with(prefix.as_str()) {
                return Err!("Scripted failure for: {}", command_line);
            }
        }

        Ok(())
    }
}
