//! Subcommands and the setup they share.
pub mod apply;
pub mod extract;
pub mod validate;
pub mod version;

use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::RunConfig;
use crate::logging::Logger;
use crate::pipeline::{CancellationFlag, Severity};

/// Load the run configuration, narrow it by `--only`/`--skip`, route its
/// progress and message callbacks to `log`, and make it observe `cancel`.
///
/// # Errors
///
/// Returns an error if the configuration file is invalid or names an
/// unknown category.
pub fn load_run_config(
    global: &GlobalOpts,
    log: &Arc<Logger>,
    cancel: &CancellationFlag,
) -> Result<RunConfig> {
    log.stage("Loading configuration");
    let mut config = RunConfig::load(&global.config)?.narrow(&global.only, &global.skip)?;
    config.cancel = cancel.clone();
    log.debug(&format!("categories: {:?}", config.categories));
    log.debug(&format!("{} parameter override(s)", config.parameters.len()));
    if config.categories.is_empty() {
        log.warn("no categories enabled; nothing will run");
    }

    let progress_log = Arc::clone(log);
    let message_log = Arc::clone(log);
    config.notifier = std::mem::take(&mut config.notifier)
        .on_progress(move |name, step, total| progress_log.progress(name, step, total))
        .on_message(move |text, severity| match severity {
            Severity::Info => message_log.debug(text),
            Severity::Warning => message_log.warn(text),
            Severity::Error => message_log.error(text),
        });
    Ok(config)
}

/// Print the summary and bail if any handler faulted.
///
/// # Errors
///
/// Returns an error if one or more handlers recorded a fault.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} handler(s) failed");
    }
    Ok(())
}
