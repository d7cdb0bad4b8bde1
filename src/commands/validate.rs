//! Command: dry-run a template and report tokens that stay unresolved.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, ValidateOpts};
use crate::logging::{Log, Logger};
use crate::pipeline::{CancellationFlag, Pipeline};
use crate::target::{JsonTarget, MemoryTarget, Target};
use crate::template::{Template, identity_key};
use crate::tokens::TokenContext;

/// URL of the scratch target used when no target document is given.
const SCRATCH_URL: &str = "https://localhost/sites/validate";

/// One entry with tokens that stayed unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leftover {
    /// Category tag of the section.
    pub category: String,
    /// Identity key of the entry, or its position when it has none.
    pub entry: String,
    /// The unresolved token spellings.
    pub tokens: Vec<String>,
}

/// Apply `template` to a throwaway copy of `target` and collect, per entry,
/// the tokens still unresolved against the resulting context.
///
/// # Errors
///
/// Returns the first handler fault.
pub fn leftovers(
    pipeline: &Pipeline<'_>,
    target: &MemoryTarget,
    template: &Template,
    config: &crate::config::RunConfig,
) -> Result<Vec<Leftover>> {
    let mut scratch = template.clone();
    let ctx = pipeline.apply(target, &mut scratch, TokenContext::for_target(target), config)?;

    let mut found = Vec::new();
    for (category, entries) in &template.sections {
        for (index, entry) in entries.iter().enumerate() {
            let tokens = ctx.unresolved_in_entry(entry);
            if tokens.is_empty() {
                continue;
            }
            found.push(Leftover {
                category: category.clone(),
                entry: identity_key(entry).map_or_else(|| format!("#{index}"), str::to_string),
                tokens,
            });
        }
    }
    Ok(found)
}

/// Run the validate command.  The target document, if any, is never
/// written.
///
/// # Errors
///
/// Returns an error if loading fails, a handler faults, or any entry
/// keeps unresolved tokens.
pub fn run(
    global: &GlobalOpts,
    opts: &ValidateOpts,
    log: &Arc<Logger>,
    cancel: &CancellationFlag,
) -> Result<()> {
    let config = super::load_run_config(global, log, cancel)?;
    let template = Template::load(&opts.template)?;
    let target = match &opts.target {
        Some(path) => JsonTarget::open(path)?.snapshot(),
        None => MemoryTarget::new(SCRATCH_URL, "Validate"),
    };
    log.info(&format!("simulating against {}", target.url()));

    let pipeline = Pipeline::standard(Arc::clone(log) as Arc<dyn Log>);
    let found = match leftovers(&pipeline, &target, &template, &config) {
        Ok(found) => found,
        Err(e) => {
            log.print_summary();
            return Err(e);
        }
    };

    log.stage("Unresolved tokens");
    for leftover in &found {
        log.warn(&format!(
            "{}/{}: {}",
            leftover.category,
            leftover.entry,
            leftover.tokens.join(", ")
        ));
    }
    if found.is_empty() {
        log.info("every token resolves");
    } else {
        anyhow::bail!("{} entr(ies) with unresolved tokens", found.len());
    }
    super::finish(log)
}
