use clap::{Arg, ArgAction, ArgMatches, Command};
use const_format::formatcp;
use indoc::indoc;

use crate::core::GenericResult;

use super::Action;

pub struct Parser {
    matches: Option<ArgMatches>,
}

pub struct GlobalOptions {
    pub log_level: log::Level,
    pub config_path: String,
    pub dry_run: bool,
}

impl Parser {
    pub fn new() -> Parser {
        Parser {matches: None}
    }

    pub fn parse_global(&mut self) -> GenericResult<GlobalOptions> {
        const DEFAULT_CONFIG_PATH: &str = "~/.snapback.yaml";

        let matches = new_command("snapback", "Snapshot-based incremental backup orchestrator")
            .version(env!("CARGO_PKG_VERSION"))

            .subcommand_required(true)
            .arg_required_else_help(true)
            .disable_help_subcommand(true)
            .help_expected(true)

            .arg(Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help(formatcp!("Configuration file path [default: {}]", DEFAULT_CONFIG_PATH)))

            .arg(Arg::new("cron")
                .long("cron")
                .action(ArgAction::SetTrue)
                .help("Show only warning and error messages (intended to be used from cron)"))

            .arg(Arg::new("verbose")
                .short('v').long("verbose")
                .conflicts_with("cron")
                .action(ArgAction::Count)
                .help("Set verbosity level"))

            .arg(Arg::new("dry_run")
                .short('n').long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Log the commands that would be executed without running them or updating any state"))

            .subcommand(new_command(
                "backup", "Run backup process for the specified backup name")
                .arg(Arg::new("NAME")
                    .help("Backup name")
                    .required(true)))

            .get_matches();

        let log_level = match matches.get_count("verbose") {
            0 => if matches.get_flag("cron") {
                log::Level::Warn
            } else {
                log::Level::Info
            },
            1 => log::Level::Debug,
            2 => log::Level::Trace,
            _ => return Err!("Invalid verbosity level"),
        };

        let config_path = matches.get_one::<String>("config").cloned().unwrap_or_else(||
            shellexpand::tilde(DEFAULT_CONFIG_PATH).to_string());

        let dry_run = matches.get_flag("dry_run");

        self.matches.replace(matches);

        Ok(GlobalOptions {log_level, config_path, dry_run})
    }

    pub fn parse(self) -> GenericResult<Action> {
        let (command, matches) = self.matches.as_ref().unwrap().subcommand().unwrap();

        Ok(match command {
            "backup" => Action::Backup {
                name: matches.get_one::<String>("NAME").unwrap().to_owned(),
            },

            _ => unreachable!(),
        })
    }
}

fn new_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        // Default template contains `{bin} {version}` for some reason
        .help_template(indoc!("
            {before-help}{about}

            {usage-heading}
                {usage}

            {all-args}{after-help}\
        "))
        .about(about)
}
