//! `provisioner` command-line entry point.
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use provisioner::pipeline::CancellationFlag;
use provisioner::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    if matches!(args.command, cli::Command::Version) {
        commands::version::run();
        return Ok(());
    }

    let tag = args.command.tag();
    logging::init_subscriber(args.verbose, tag);
    let log = Arc::new(logging::Logger::new(tag));

    let cancel = CancellationFlag::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        log.warn(&format!("{e:#}"));
    }

    match &args.command {
        cli::Command::Apply(opts) => commands::apply::run(&args.global, opts, &log, &cancel),
        cli::Command::Extract(opts) => commands::extract::run(&args.global, opts, &log, &cancel),
        cli::Command::Validate(opts) => {
            commands::validate::run(&args.global, opts, &log, &cancel)
        }
        cli::Command::Version => Ok(()),
    }
}
