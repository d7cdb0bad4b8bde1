#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for applying templates through the standard pipeline.
//!
//! These tests drive every built-in handler against an in-memory site and
//! check the properties a caller relies on: fixed handler order for any
//! category selection, monotonic progress, convergence on re-apply, and
//! fault propagation.

mod common;

use std::sync::Arc;

use common::*;
use provisioner::config::{Category, CategorySet};
use provisioner::handlers::{HANDLERS, list_items};
use provisioner::logging::{HandlerStatus, Log};
use provisioner::pipeline::Pipeline;
use provisioner::target::Target;
use provisioner::tokens::TokenContext;

fn pipeline() -> (Pipeline<'static>, Arc<RecordingLog>) {
    let log = Arc::new(RecordingLog::default());
    (Pipeline::standard(Arc::clone(&log) as Arc<dyn Log>), log)
}

// ---------------------------------------------------------------------------
// Snapshot: handler order
// ---------------------------------------------------------------------------

/// Snapshot of every handler's display name in run order.
///
/// Any addition, removal, reorder or rename of a handler fails this test,
/// prompting a deliberate snapshot update.
#[test]
fn apply_handler_names() {
    let names: Vec<&str> = HANDLERS.iter().map(|h| h.name()).collect();
    insta::assert_snapshot!("apply_handler_names", names.join("\n"));
}

// ---------------------------------------------------------------------------
// Ordering and progress
// ---------------------------------------------------------------------------

/// For each of the 64 category selections the handlers that start are
/// exactly the enabled ones, in table order, with progress `1..=N`.
#[test]
fn enabled_handlers_run_in_table_order_for_every_selection() {
    for mask in 0u32..64 {
        let enabled: CategorySet = Category::ALL
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, c)| *c)
            .collect();
        let site = dev_site();
        let (config, events, steps) = recording_config(enabled, true);
        let (pipeline, _) = pipeline();

        pipeline
            .apply(
                &site,
                &mut full_template(),
                TokenContext::for_target(&site),
                &config,
            )
            .unwrap_or_else(|e| panic!("mask {mask:#08b}: {e:#}"));

        let expected: Vec<String> = HANDLERS
            .iter()
            .filter(|h| enabled.contains(h.category()))
            .map(|h| h.internal_name().to_string())
            .collect();
        assert_eq!(events.started(), expected, "mask {mask:#08b}");

        let indices: Vec<usize> = steps.lock().unwrap().iter().map(|s| s.1).collect();
        assert_eq!(indices, (1..=expected.len()).collect::<Vec<_>>());
    }
}

#[test]
fn empty_sections_are_not_applicable() {
    let site = dev_site();
    let (config, events, _) = recording_config(CategorySet::all(), false);
    let (pipeline, log) = pipeline();
    let mut template = TemplateBuilder::new()
        .entry("fields", serde_json::json!({"name": "Priority"}))
        .build();

    pipeline
        .apply(&site, &mut template, TokenContext::for_target(&site), &config)
        .unwrap();

    assert_eq!(events.started(), vec!["fields"]);
    let applied: Vec<String> = log
        .statuses()
        .into_iter()
        .filter(|(_, s)| *s == HandlerStatus::Applied)
        .map(|(n, _)| n)
        .collect();
    assert_eq!(applied, vec!["Fields"]);
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[test]
fn second_apply_converges_without_writes() {
    let site = dev_site();
    let (config, _, _) = recording_config(CategorySet::all(), true);
    let (pipeline, _) = pipeline();

    pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &config)
        .unwrap();
    let writes = site.writes();
    assert!(writes > 0);

    pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &config)
        .unwrap();
    assert_eq!(site.writes(), writes);
}

#[test]
fn tokens_flow_between_handlers() {
    let site = dev_site();
    let (config, _, _) = recording_config(CategorySet::all(), false);
    let (pipeline, _) = pipeline();

    let ctx = pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &config)
        .unwrap();

    let field = site.find("fields", "Priority").unwrap().unwrap();
    let list = site.find("lists", "Tasks").unwrap().unwrap();
    assert_eq!(list["fields"][0], field["id"]);
    assert_eq!(ctx.lookup("{listid:Tasks}"), list["id"].as_str());
    assert_eq!(
        site.find("navigation", "Tasks").unwrap().unwrap()["url"],
        "/sites/dev/Lists/Tasks"
    );
    let rows = list_items::rows_section(list["id"].as_str().unwrap());
    let row = site.find(&rows, "Kickoff").unwrap().unwrap();
    assert_eq!(row["listid"], list["id"]);
    assert_eq!(
        site.find("property-bag", "Owner").unwrap().unwrap()["value"],
        "alice"
    );
    assert_eq!(
        site.find("subsites", "Projects").unwrap().unwrap()["description"],
        "Projects"
    );
    assert_eq!(ctx.scope(), ctx.root());
}

#[test]
fn run_parameters_override_template_defaults() {
    let site = dev_site();
    let (mut config, _, _) =
        recording_config(CategorySet::none().with(Category::PropertyBag), false);
    config
        .parameters
        .insert("Owner".to_string(), "bob".to_string());
    let (pipeline, _) = pipeline();

    pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &config)
        .unwrap();

    assert_eq!(
        site.find("property-bag", "Owner").unwrap().unwrap()["value"],
        "bob"
    );
}

/// Rows are keyed per list, so two lists may each hold a row with the same
/// title on a first apply without conflict tolerance.
#[test]
fn same_row_title_in_two_lists_applies_cleanly() {
    let site = dev_site();
    let (config, events, _) = recording_config(CategorySet::all(), false);
    let (pipeline, _) = pipeline();
    let mut template = TemplateBuilder::new()
        .entry("lists", serde_json::json!({"title": "Tasks"}))
        .entry("lists", serde_json::json!({"title": "Issues"}))
        .entry("list-items", serde_json::json!({"list": "Tasks", "title": "Item 1"}))
        .entry("list-items", serde_json::json!({"list": "Issues", "title": "Item 1"}))
        .build();

    let ctx = pipeline
        .apply(&site, &mut template, TokenContext::for_target(&site), &config)
        .unwrap();

    for list in ["Tasks", "Issues"] {
        let id = ctx.lookup(&format!("{{listid:{list}}}")).unwrap();
        let rows = site.entries(&list_items::rows_section(id)).unwrap();
        assert_eq!(rows.len(), 1, "{list}");
        assert_eq!(rows[0]["title"], "Item 1");
    }
    assert!(events.events().iter().all(|e| !e.starts_with("exception-occurred")));
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

/// Without conflict tolerance the duplicate row on re-apply faults the
/// list-items handler; later handlers never start.
#[test]
fn conflict_without_tolerance_aborts_the_run() {
    let site = dev_site();
    let (pipeline, _) = pipeline();
    let (first, _, _) = recording_config(CategorySet::all(), false);
    pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &first)
        .unwrap();

    let (config, events, _) = recording_config(CategorySet::all(), false);
    let (pipeline, log) = self::pipeline();
    let err = pipeline
        .apply(&site, &mut full_template(), TokenContext::for_target(&site), &config)
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("list-items/"), "{message}");
    assert!(message.ends_with("entry 'Kickoff' already exists"), "{message}");
    let exceptions: Vec<String> = events
        .events()
        .into_iter()
        .filter(|e| e.starts_with("exception-occurred"))
        .collect();
    assert_eq!(exceptions, vec!["exception-occurred:list-items"]);
    assert!(!events.started().contains(&"navigation".to_string()));
    assert!(!events.events().contains(&"run-completed".to_string()));
    assert_eq!(
        log.statuses().last().unwrap(),
        &("List items".to_string(), HandlerStatus::Faulted)
    );
}
