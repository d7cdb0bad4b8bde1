//! Lists and libraries.
use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;

use super::fields::ProvisionFields;
use super::helpers::{self, HandlerStats, ProcessOpts};
use super::{Handler, handler_deps, has_entries, target_has_entries};
use crate::config::{Category, RunConfig};
use crate::resources::EntryResource;
use crate::target::{ID_FIELD, Target};
use crate::template::{Entry, Template, identity_key, str_field};
use crate::tokens::{TokenContext, TokenDefinition};

/// Provisions lists and registers `{listid:TITLE}` and `{listurl:TITLE}`
/// in the current scope.
///
/// A list's `url` is relative to its site and defaults to `Lists/<title>`.
/// Field references use `{fieldid:NAME}`, so fields must exist first.
#[derive(Debug)]
pub struct ProvisionLists;

impl ProvisionLists {
    pub(super) fn relative_url(entry: &Entry, title: &str) -> String {
        str_field(entry, "url").map_or_else(
            || format!("Lists/{title}"),
            |url| url.trim_matches('/').to_string(),
        )
    }
}

impl Handler for ProvisionLists {
    fn name(&self) -> &'static str {
        "Lists"
    }

    fn internal_name(&self) -> &'static str {
        "lists"
    }

    fn category(&self) -> Category {
        Category::Lists
    }

    handler_deps![ProvisionFields];

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
        let opts = ProcessOpts::apply_all("provision list");
        let mut stats = HandlerStats::default();
        for entry in template.section(self.category().tag()) {
            let Some(resolved) = helpers::resolve_or_skip(ctx, config, self.category(), entry)
            else {
                stats.skipped += 1;
                continue;
            };
            let resource = EntryResource::new(target, self.category().tag(), resolved.clone());
            stats += helpers::process_single(config, &resource, &opts)?;

            let (Some(title), Some(id)) = (resource.key(), resource.id()?) else {
                continue;
            };
            let url = format!(
                "{}/{}",
                ctx.scope().server_relative_path(),
                Self::relative_url(&resolved, title)
            );
            ctx.register(&TokenDefinition::scoped([format!("{{listid:{title}}}")], id)?);
            ctx.register(&TokenDefinition::scoped([format!("{{listurl:{title}}}")], url)?);
        }
        stats.report(self.name(), config);
        Ok(())
    }

    fn extract(&self, target: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
        helpers::extract_section(target, template, self.category(), &[])?;

        let field_tokens: HashMap<String, String> = target
            .entries(Category::Fields.tag())?
            .iter()
            .filter_map(|field| {
                let id = str_field(field, ID_FIELD)?;
                let name = identity_key(field)?;
                Some((id.to_ascii_lowercase(), format!("{{fieldid:{name}}}")))
            })
            .collect();
        if field_tokens.is_empty() {
            return Ok(());
        }
        if let Some(lists) = template.sections.get_mut(self.category().tag()) {
            for list in lists.iter_mut() {
                if let Some(Value::Array(refs)) = list.get_mut("fields") {
                    for field_ref in refs.iter_mut() {
                        if let Some(token) = field_ref
                            .as_str()
                            .and_then(|id| field_tokens.get(&id.to_ascii_lowercase()))
                        {
                            *field_ref = Value::String(token.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{context, recording_config, target};
    use crate::template::test_helpers::entry;
    use crate::tokens::Scope;
    use serde_json::json;

    fn template() -> Template {
        let mut t = Template::default();
        t.set_section("fields", vec![entry(json!({"name": "Status"}))]);
        t.set_section(
            "lists",
            vec![
                entry(json!({"title": "Tasks", "fields": ["{fieldid:Status}"]})),
                entry(json!({"title": "Documents", "url": "/Shared Documents/"})),
            ],
        );
        t
    }

    #[test]
    fn registers_scoped_list_tokens() {
        let t = target();
        let mut ctx = context(&t);
        let (config, _) = recording_config(false);
        let mut tpl = template();

        ProvisionFields.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        ProvisionLists.apply(&t, &mut tpl, &mut ctx, &config).unwrap();

        let tasks = t.find("lists", "Tasks").unwrap().unwrap();
        let field_id = ctx.lookup("{fieldid:Status}").unwrap();
        assert_eq!(tasks["fields"], json!([field_id]));
        assert_eq!(ctx.lookup("{listid:Tasks}"), tasks["id"].as_str());
        assert_eq!(
            ctx.parse_string("{listurl:Tasks}"),
            "/sites/dev/Lists/Tasks"
        );
        assert_eq!(
            ctx.parse_string("{listurl:documents}"),
            "/sites/dev/Shared Documents"
        );
    }

    #[test]
    fn list_tokens_do_not_leak_into_other_scopes() {
        let t = target();
        let mut ctx = context(&t);
        let (config, _) = recording_config(false);
        let mut tpl = template();
        ProvisionLists.apply(&t, &mut tpl, &mut ctx, &config).unwrap();

        let child = Scope::new("https://contoso.example/sites/dev/projects", "2", "Projects");
        ctx.with_scope(child, |inner| {
            assert!(inner.lookup("{listid:Documents}").is_none());
        });
        assert!(ctx.lookup("{listid:Documents}").is_some());
    }

    #[test]
    fn lists_depend_on_fields() {
        assert_eq!(
            ProvisionLists.dependencies(),
            &[std::any::TypeId::of::<ProvisionFields>()]
        );
    }

    #[test]
    fn second_apply_is_idempotent() {
        let t = target();
        let (config, _) = recording_config(false);
        let mut tpl = template();
        let mut ctx = context(&t);
        ProvisionFields.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        ProvisionLists.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        let writes = t.writes();

        let mut ctx = context(&t);
        ProvisionFields.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        ProvisionLists.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        assert_eq!(t.writes(), writes);
    }

    #[test]
    fn extract_turns_field_ids_back_into_tokens() {
        let t = target();
        let (config, _) = recording_config(false);
        let mut tpl = template();
        let mut ctx = context(&t);
        ProvisionFields.apply(&t, &mut tpl, &mut ctx, &config).unwrap();
        ProvisionLists.apply(&t, &mut tpl, &mut ctx, &config).unwrap();

        let mut out = Template::default();
        ProvisionLists.extract(&t, &mut out, &config).unwrap();
        let tasks = out
            .section("lists")
            .iter()
            .find(|l| l["title"] == "Tasks")
            .unwrap();
        assert_eq!(tasks["fields"], json!(["{fieldid:Status}"]));
    }
}
