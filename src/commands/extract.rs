//! Command: extract a portable template from a target document.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{ExtractOpts, GlobalOpts};
use crate::logging::{Log, Logger};
use crate::pipeline::{CancellationFlag, Pipeline};
use crate::target::{JsonTarget, Target};
use crate::template::Template;

/// Run the extract command.
///
/// # Errors
///
/// Returns an error if configuration or target loading fails, if any
/// handler faults, or if the template cannot be written.
pub fn run(
    global: &GlobalOpts,
    opts: &ExtractOpts,
    log: &Arc<Logger>,
    cancel: &CancellationFlag,
) -> Result<()> {
    log.info(&format!("provisioner {}", super::version::current()));
    let config = super::load_run_config(global, log, cancel)?;

    let target = JsonTarget::open(&opts.target)?;
    log.info(&format!("target: {} ({})", target.title(), target.url()));

    let base = opts.base.as_deref().map(Template::load).transpose()?;
    let pipeline = Pipeline::standard(Arc::clone(log) as Arc<dyn Log>);
    let outcome = match &base {
        Some(base) => pipeline.extract_delta(&target, Template::default(), &config, base),
        None => pipeline.extract(&target, Template::default(), &config),
    };

    let template = match outcome {
        Ok(template) => template,
        Err(e) => {
            log.print_summary();
            return Err(e);
        }
    };

    template.save(&opts.out)?;
    log.info(&format!(
        "wrote {} entries to {}",
        template.entry_count(),
        opts.out.display()
    ));
    super::finish(log)
}
