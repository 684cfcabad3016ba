mod ledger;
mod period;
mod session;
mod snapshot;
mod strategy;

use chrono::Local;
use easy_logging::GlobalContext;
use log::error;

use crate::config::BackupConfig;
use crate::core::GenericResult;
use crate::runner::SystemRunner;
use crate::sync;

pub use self::ledger::{DEPS_FILE_NAME, LAST_SUCCESSFUL_FILE_NAME};
pub use self::session::BackupSession;

pub struct BackupOptions {
    pub dry_run: bool,
}

pub fn backup(config: &BackupConfig, options: &BackupOptions) -> GenericResult<String> {
    let _context = GlobalContext::new(&config.name);

    let runner = SystemRunner::new(options.dry_run);
    let result = BackupSession::new(config, &runner, Local::now(), options.dry_run)
        .and_then(|session| session.run());

    let sync_result = match config.sync.as_ref() {
        Some(sync_config) if sync_config.enabled && (
            result.is_ok() || sync_config.sync_on_failure
        ) => {
            sync::sync(sync_config, &config.target, &runner, options.dry_run)
        },
        _ => Ok(()),
    };

    // The backup error is the one the operator must see first
    match (result, sync_result) {
        (Ok(archive_name), Ok(())) => Ok(archive_name),
        (Ok(_), Err(err)) => Err!("Sync failed: {}", err),
        (Err(err), sync_result) => {
            if let Err(sync_err) = sync_result {
                error!("Sync failed: {}.", sync_err);
            }
            Err(err)
        },
    }
}
