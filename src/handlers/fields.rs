//! Site field definitions.
use anyhow::Result;

use super::helpers::{self, HandlerStats, ProcessOpts};
use super::{Handler, has_entries, target_has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::Target;
use crate::template::Template;
use crate::tokens::{TokenContext, TokenDefinition};

/// Provisions field definitions and registers `{fieldid:NAME}` for each.
///
/// Fields whose values still contain unresolved tokens are skipped with a
/// warning rather than provisioned with placeholder text.
#[derive(Debug)]
pub struct ProvisionFields;

impl Handler for ProvisionFields {
    fn name(&self) -> &'static str {
        "Fields"
    }

    fn internal_name(&self) -> &'static str {
        "fields"
    }

    fn category(&self) -> Category {
        Category::Fields
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
        let opts = ProcessOpts::apply_all("provision field");
        let mut stats = HandlerStats::default();
        for entry in template.section(self.category().tag()) {
            let Some(resolved) = helpers::resolve_or_skip(ctx, config, self.category(), entry)
            else {
                stats.skipped += 1;
                continue;
            };
            let resource = EntryResource::new(target, self.category().tag(), resolved);
            stats += helpers::process_single(config, &resource, &opts)?;
            if let (Some(name), Some(id)) = (resource.key(), resource.id()?) {
                ctx.register(&TokenDefinition::new([format!("{{fieldid:{name}}}")], id)?);
            }
        }
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        helpers::extract_section(target, template, self.category(), &[])?;
        Ok(())
    }
}
