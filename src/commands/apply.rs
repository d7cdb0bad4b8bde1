//! Command: apply a template to a target document.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{ApplyOpts, GlobalOpts};
use crate::logging::{Log, Logger};
use crate::pipeline::{CancellationFlag, Pipeline};
use crate::target::{JsonTarget, Target};
use crate::template::Template;
use crate::tokens::TokenContext;

/// Run the apply command.
///
/// Writes made before a fault are kept: the target document is saved
/// whenever anything changed.
///
/// # Errors
///
/// Returns an error if configuration, template or target loading fails,
/// or if any handler faults.
pub fn run(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    log: &Arc<Logger>,
    cancel: &CancellationFlag,
) -> Result<()> {
    log.info(&format!("provisioner {}", super::version::current()));
    let config = super::load_run_config(global, log, cancel)?;

    log.stage("Loading template");
    let mut template = Template::load(&opts.template)?;
    log.info(&format!(
        "{} entries in {} section(s)",
        template.entry_count(),
        template.sections.len()
    ));

    let target = JsonTarget::open_or_init(&opts.target, &opts.url, &opts.title)?;
    log.info(&format!("target: {} ({})", target.title(), target.url()));

    let pipeline = Pipeline::standard(Arc::clone(log) as Arc<dyn Log>);
    let outcome = pipeline.apply(
        &target,
        &mut template,
        TokenContext::for_target(&target),
        &config,
    );

    if target.writes() > 0 {
        target.save()?;
        log.info(&format!(
            "saved {} write(s) to {}",
            target.writes(),
            target.path().display()
        ));
    } else {
        log.debug("target unchanged");
    }

    match outcome {
        Ok(ctx) => {
            log.debug(&format!("{} token alias(es) registered", ctx.len()));
            super::finish(log)
        }
        Err(e) => {
            log.print_summary();
            Err(e)
        }
    }
}
