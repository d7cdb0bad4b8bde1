//! Navigation nodes.
use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;

use super::helpers::{self, HandlerStats, ProcessOpts};
use super::lists::ProvisionLists;
use super::{Handler, handler_deps, has_entries, target_has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::Target;
use crate::template::{Template, identity_key};
use crate::tokens::{Scope, TokenContext};

/// Provisions navigation nodes.  Node URLs usually point at lists through
/// `{listurl:TITLE}`; on extraction such URLs are turned back into tokens.
#[derive(Debug)]
pub struct ProvisionNavigation;

impl Handler for ProvisionNavigation {
    fn name(&self) -> &'static str {
        "Navigation"
    }

    fn internal_name(&self) -> &'static str {
        "navigation"
    }

    fn category(&self) -> Category {
        Category::Navigation
    }

    handler_deps![ProvisionLists];

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
        let opts = ProcessOpts::apply_all("provision navigation node");
        let mut stats = HandlerStats::default();
        let mut resources = Vec::new();
        for entry in template.section(self.category().tag()) {
            match helpers::resolve_or_skip(ctx, config, self.category(), entry) {
                Some(resolved) => {
                    resources.push(EntryResource::new(target, self.category().tag(), resolved));
                }
                None => stats.skipped += 1,
            }
        }
        stats += helpers::process_resources(config, resources, &opts)?;
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        let path = Scope::of(target).server_relative_path().to_string();
        let list_urls: HashMap<String, String> = target
            .entries(Category::Lists.tag())?
            .iter()
            .filter_map(|list| {
                let title = identity_key(list)?;
                let url = format!("{path}/{}", ProvisionLists::relative_url(list, title));
                Some((url.to_ascii_lowercase(), format!("{{listurl:{title}}}")))
            })
            .collect();

        let mut nodes = target.entries(self.category().tag())?;
        for node in &mut nodes {
            if let Some(Value::String(url)) = node.get_mut("url")
                && let Some(token) = list_urls.get(&url.to_ascii_lowercase())
            {
                *url = token.clone();
            }
        }
        let ctx = TokenContext::for_target(target);
        let portable = nodes
            .into_iter()
            .map(|node| helpers::portable_entry(&ctx, node))
            .collect();
        template.set_section(self.category().tag(), portable);
        Ok(())
    }
}
