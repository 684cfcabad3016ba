use std::process::Command;

use itertools::Itertools;
use log::{error, info};

use crate::core::EmptyResult;

/// Executes external commands on behalf of the backup pipeline.
///
/// The trait is the seam between the pipeline and the operating system: the
/// only production implementation is `SystemRunner`, tests substitute their
/// own recording runners.
pub trait CommandRunner {
    fn execute(&self, command: &[String]) -> EmptyResult;
}

pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> SystemRunner {
        SystemRunner {dry_run}
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&self, command: &[String]) -> EmptyResult {
        // The command line is always logged before any execution attempt
        info!("Command: {}", format_command(command));

        if self.dry_run {
            return Ok(());
        }

        let program = command.first().ok_or("An attempt to execute an empty command")?;

        let status = Command::new(program).args(&command[1..]).status().map_err(|e| format!(
            "Unable to execute {:?}: {}", program, e))?;

        if !status.success() {
            let error = format!("{:?} has failed: {}", program, status);
            error!("{}.", error);
            return Err(error.into());
        }

        Ok(())
    }
}

pub fn format_command(command: &[String]) -> String {
    command.iter().map(|arg| {
        if arg.is_empty() || arg.contains(' ') {
            format!("{:?}", arg)
        } else {
            arg.to_owned()
        }
    }).join(" ")
}
