#[macro_use]
mod core;

mod backuping;
mod cli;
mod config;
mod runner;
mod sync;

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::process;

use log::error;

use crate::cli::{Action, GlobalOptions, Parser};
use crate::config::Config;
use crate::core::EmptyResult;

fn main() {
    let mut parser = Parser::new();

    let global = parser.parse_global().unwrap_or_else(|e| {
        let _ = writeln!(io::stderr(), "Command line arguments parsing error: {}.", e);
        process::exit(1);
    });

    if let Err(e) = easy_logging::init(module_path!(), global.log_level) {
        let _ = writeln!(io::stderr(), "Failed to initialize the logging: {}.", e);
        process::exit(1);
    }

    if let Err(err) = run(parser, &global) {
        error!("{}.", err);
        process::exit(1);
    }
}

fn run(parser: Parser, global: &GlobalOptions) -> EmptyResult {
    let config = Config::load(&global.config_path).map_err(|e| format!(
        "Error while reading {:?} configuration file: {}", global.config_path, e))?;

    match parser.parse()? {
        Action::Backup {name} => {
            let backup_config = config.get_backup(&name)?;
            backuping::backup(backup_config, &backuping::BackupOptions {
                dry_run: global.dry_run,
            })?;
        },
    }

    Ok(())
}
