//! Site property bag.
use anyhow::Result;

use super::helpers::{self, HandlerStats, ProcessOpts};
use super::{Handler, has_entries, target_has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::Target;
use crate::template::Template;
use crate::tokens::TokenContext;

/// Upserts `{"key": ..., "value": ...}` properties.
#[derive(Debug)]
pub struct ProvisionPropertyBag;

impl Handler for ProvisionPropertyBag {
    fn name(&self) -> &'static str {
        "Property bag"
    }

    fn internal_name(&self) -> &'static str {
        "property-bag"
    }

    fn category(&self) -> Category {
        Category::PropertyBag
    }

    fn will_apply(&self, _: &dyn Target, template: &Template, _: &RunConfig) -> Result<bool> {
        Ok(has_entries(template, self.category()))
    }

    fn will_extract(&self, target: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
        target_has_entries(target, self.category())
    }

    fn apply(
        &self,
        target: &dyn Target,
        template: &mut Template,
        ctx: &mut TokenContext,
        config: &RunConfig,
    ) -> Result<()> {
        let opts = ProcessOpts::apply_all("set property");
        let resources: Vec<_> = template
            .section(self.category().tag())
            .iter()
            .map(|entry| EntryResource::new(target, self.category().tag(), ctx.resolve_entry(entry)))
            .collect();
        let stats: HandlerStats = helpers::process_resources(config, resources, &opts)?;
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        helpers::extract_section(target, template, self.category(), &[])?;
        Ok(())
    }
}
