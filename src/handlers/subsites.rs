//! Child sites.
use anyhow::Result;
use serde_json::Value;

use super::helpers::{self, HandlerStats, ProcessOpts};
use super::{Handler, has_entries, target_has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::{ID_FIELD, Target};
use crate::template::{Entry, IDENTITY_FIELDS, Template, identity_key, str_field};
use crate::tokens::{Scope, TokenContext};

/// Field holding a subsite's URL relative to its parent.
const URL_FIELD: &str = "url";

/// Provisions child sites.
///
/// Each subsite is created from its entry resolved in the parent scope so
/// that the target assigns it an identifier.  The entry is then resolved
/// again with the child as current scope, so `{site}`, `{siteid}` and
/// `{sitetitle}` refer to the subsite itself, and the subsite is updated if
/// that changes anything.  Identity fields always keep their parent-scope
/// value.
#[derive(Debug)]
pub struct ProvisionSubsites;

impl ProvisionSubsites {
    fn child_scope(parent: &Scope, site: &Entry) -> Option<Scope> {
        let url = str_field(site, URL_FIELD)?;
        let id = str_field(site, ID_FIELD).unwrap_or_default();
        let title = identity_key(site).unwrap_or(url);
        Some(parent.child(url, id, title))
    }
}

impl Handler for ProvisionSubsites {
    fn name(&self) -> &'static str {
        "Subsites"
    }

    fn internal_name(&self) -> &'static str {
        "subsites"
    }

    fn category(&self) -> Category {
        Category::Subsites
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
        let tag = self.category().tag();
        let opts = ProcessOpts::apply_all("provision subsite");
        let mut stats = HandlerStats::default();
        for entry in template.section(tag) {
            let outer = ctx.resolve_entry(entry);
            let (Some(key), Some(_)) = (identity_key(&outer), str_field(&outer, URL_FIELD)) else {
                helpers::warn(config, "skipping subsite without a title and url");
                stats.skipped += 1;
                continue;
            };

            let created = if target.find(tag, key)?.is_none() {
                target.create(tag, &outer)?;
                true
            } else {
                false
            };
            let Some(site) = target.find(tag, key)? else {
                helpers::warn(
                    config,
                    &format!("skipping subsite '{key}': not found after create"),
                );
                stats.skipped += 1;
                continue;
            };
            let Some(child) = Self::child_scope(ctx.scope(), &site) else {
                helpers::warn(
                    config,
                    &format!("skipping subsite '{key}': target entry has no url"),
                );
                stats.skipped += 1;
                continue;
            };

            let inner = ctx.with_scope(child, |child_ctx| {
                helpers::resolve_or_skip(child_ctx, config, self.category(), entry)
            });
            let Some(mut inner) = inner else {
                stats.skipped += 1;
                continue;
            };
            // The site keeps the identity it was created under.
            for field in IDENTITY_FIELDS {
                if let Some(value) = outer.get(field) {
                    inner.insert(field.to_string(), value.clone());
                }
            }
            let mut delta =
                helpers::process_single(config, &EntryResource::new(target, tag, inner), &opts)?;
            if created {
                delta.changed += delta.already_ok;
                delta.already_ok = 0;
            }
            stats += delta;
        }
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        let mut ctx = TokenContext::for_target(target);
        let root = ctx.root().clone();
        let sites: Vec<Entry> = target
            .entries(self.category().tag())?
            .into_iter()
            .map(|site| {
                let Some(child) = Self::child_scope(&root, &site) else {
                    return helpers::portable_entry(&ctx, site);
                };
                let identity: Vec<(String, Value)> = site
                    .iter()
                    .filter(|(k, _)| IDENTITY_FIELDS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut portable =
                    ctx.with_scope(child, |child_ctx| helpers::portable_entry(child_ctx, site));
                portable.extend(identity);
                portable
            })
            .collect();
        template.set_section(self.category().tag(), sites);
        Ok(())
    }
}
