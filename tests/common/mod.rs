// Shared helpers for integration tests.
//
// Provides in-memory targets, a fluent template builder, and recording sinks
// for webhooks and progress so each integration test can drive a full
// pipeline run without touching the filesystem.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use provisioner::config::{CategorySet, RunConfig};
use provisioner::logging::{HandlerEntry, HandlerStatus, Log};
use provisioner::pipeline::{LifecycleEvent, Notifier, Webhook};
use provisioner::target::MemoryTarget;
use provisioner::template::{Entry, Template};
use serde_json::Value;

/// URL of the default test site.
pub const DEV_URL: &str = "https://contoso.example/sites/dev";

/// An empty site at [`DEV_URL`] titled "Dev".
pub fn dev_site() -> MemoryTarget {
    MemoryTarget::new(DEV_URL, "Dev")
}

/// Log that drops messages and keeps handler records.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<HandlerEntry>>,
}

impl RecordingLog {
    /// Recorded `(handler name, status)` pairs in order.
    pub fn statuses(&self) -> Vec<(String, HandlerStatus)> {
        self.entries
            .lock()
            .expect("log lock")
            .iter()
            .map(|e| (e.name.clone(), e.status))
            .collect()
    }
}

impl Log for RecordingLog {
    fn stage(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn debug(&self, _: &str) {}
    fn warn(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn record_handler(&self, name: &str, status: HandlerStatus, message: Option<&str>) {
        self.entries.lock().expect("log lock").push(HandlerEntry {
            name: name.to_string(),
            status,
            message: message.map(String::from),
        });
    }
}

/// Webhook recording `kind[:handler]` for every event.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventRecorder {
    /// Every event received so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    /// Internal names of the handlers that started, in order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("handler-started:").map(str::to_string))
            .collect()
    }
}

impl Webhook for EventRecorder {
    fn send(&self, event: &LifecycleEvent<'_>) {
        let line = event.handler().map_or_else(
            || event.kind().tag().to_string(),
            |h| format!("{}:{h}", event.kind().tag()),
        );
        self.events.lock().expect("events lock").push(line);
    }
}

/// Progress steps reported during a run.
pub type Steps = Arc<Mutex<Vec<(String, usize, usize)>>>;

/// A run configuration over `categories` that records events and progress.
pub fn recording_config(
    categories: CategorySet,
    tolerate: bool,
) -> (RunConfig, EventRecorder, Steps) {
    let recorder = EventRecorder::default();
    let steps: Steps = Arc::default();
    let sink = Arc::clone(&steps);
    let notifier = Notifier::new()
        .with_webhook(recorder.clone())
        .on_progress(move |name, step, total| {
            sink.lock()
                .expect("steps lock")
                .push((name.to_string(), step, total));
        });
    let config = RunConfig::new()
        .with_categories(categories)
        .tolerate_conflicts(tolerate)
        .with_notifier(notifier);
    (config, recorder, steps)
}

/// Fluent builder for templates.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    /// An empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default parameter value.
    pub fn parameter(mut self, name: &str, value: &str) -> Self {
        self.template
            .parameters
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Append an entry to a category section.
    pub fn entry(mut self, category: &str, value: Value) -> Self {
        let map: Entry = value
            .as_object()
            .cloned()
            .expect("entries must be JSON objects");
        self.template.section_mut(category).push(map);
        self
    }

    /// The finished template.
    pub fn build(self) -> Template {
        self.template
    }
}

/// A template with entries in every category, cross-referencing each
/// other through tokens.
pub fn full_template() -> Template {
    use serde_json::json;
    TemplateBuilder::new()
        .parameter("Owner", "alice")
        .entry(
            "subsites",
            json!({"title": "Projects", "url": "projects", "description": "{sitetitle}"}),
        )
        .entry("fields", json!({"name": "Priority", "type": "choice"}))
        .entry(
            "lists",
            json!({"title": "Tasks", "fields": ["{fieldid:Priority}"]}),
        )
        .entry("list-items", json!({"list": "Tasks", "title": "Kickoff"}))
        .entry(
            "navigation",
            json!({"title": "Tasks", "url": "{listurl:Tasks}"}),
        )
        .entry("property-bag", json!({"key": "Owner", "value": "{parameter:Owner}"}))
        .entry("property-bag", json!({"key": "HomeUrl", "value": "{siteurl}/home"}))
        .build()
}
