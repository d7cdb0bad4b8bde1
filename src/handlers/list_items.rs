//! Rows of provisioned lists.
use anyhow::Result;
use serde_json::Value;

use super::helpers::{self, HandlerStats, ProcessOpts};
use super::lists::ProvisionLists;
use super::{Handler, handler_deps, has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::{ID_FIELD, Target};
use crate::template::{Entry, Template, identity_key, str_field};
use crate::tokens::TokenContext;

/// Field naming the list a row belongs to.
const LIST_FIELD: &str = "list";
/// Field carrying the owning list's identifier on the target.
const LIST_ID_FIELD: &str = "listid";

/// Target section holding the rows of the list identified by `list_id`.
///
/// Row keys are unique within one list only, so every list keeps its rows
/// in a section of its own.
#[must_use]
pub fn rows_section(list_id: &str) -> String {
    format!("{}/{list_id}", Category::ListItems.tag())
}

/// Rows stored on the target, grouped by the title of their list.  Lists
/// without rows are left out.
fn rows_by_list(target: &dyn Target) -> Result<Vec<(String, Vec<Entry>)>> {
    let mut grouped = Vec::new();
    for list in target.entries(Category::Lists.tag())? {
        let (Some(title), Some(id)) = (identity_key(&list), str_field(&list, ID_FIELD)) else {
            continue;
        };
        let rows = target.entries(&rows_section(id))?;
        if !rows.is_empty() {
            grouped.push((title.to_string(), rows));
        }
    }
    Ok(grouped)
}

/// Adds rows to lists provisioned earlier in the run.
///
/// Rows are inserted without reading the target first.  A row whose key
/// already exists in the same list is a duplicate-key conflict, which is
/// skipped with a warning when the run tolerates conflicts and aborts the
/// run otherwise.
#[derive(Debug)]
pub struct ProvisionListItems;

impl Handler for ProvisionListItems {
    fn name(&self) -> &'static str {
        "List items"
    }

    fn internal_name(&self) -> &'static str {
        "list-items"
    }

    fn category(&self) -> Category {
        Category::ListItems
    }

    handler_deps![ProvisionLists];

    fn will_apply(&self, _: &dyn Target, template: &Template, _: &RunConfig) -> Result<bool> {
        Ok(has_entries(template, self.category()))
    }

    fn will_extract(&self, target: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
        Ok(!rows_by_list(target)?.is_empty())
    }

    fn apply(
        &self,
        target: &dyn Target,
        template: &mut Template,
        ctx: &mut TokenContext,
        config: &RunConfig,
    ) -> Result<()> {
        let opts = ProcessOpts::insert_only("add row").tolerating(config.tolerate_conflicts);
        let mut stats = HandlerStats::default();
        for entry in template.section(self.category().tag()) {
            let Some(mut row) = helpers::resolve_or_skip(ctx, config, self.category(), entry)
            else {
                stats.skipped += 1;
                continue;
            };
            let list = str_field(&row, LIST_FIELD).unwrap_or_default().to_string();
            let Some(list_id) = ctx.lookup(&format!("{{listid:{list}}}")) else {
                helpers::warn(config, &format!("skipping row: list '{list}' was not provisioned"));
                stats.skipped += 1;
                continue;
            };
            let section = rows_section(list_id);
            row.insert(LIST_ID_FIELD.to_string(), list_id.into());
            let resource = EntryResource::new(target, &section, row).insert_only();
            stats += helpers::process_single(config, &resource, &opts)?;
        }
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        let ctx = TokenContext::for_target(target);
        let mut rows = Vec::new();
        for (list, entries) in rows_by_list(target)? {
            for mut row in entries {
                row.remove(LIST_ID_FIELD);
                row.insert(LIST_FIELD.to_string(), Value::String(list.clone()));
                rows.push(helpers::portable_entry(&ctx, row));
            }
        }
        tracing::debug!("extracted {} list rows", rows.len());
        template.set_section(self.category().tag(), rows);
        Ok(())
    }
}
