//! Run configuration: enabled categories, conflict tolerance, parameters
//! and notification sinks.
pub mod category;
pub mod toml_loader;

pub use category::{Category, CategorySet};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::pipeline::{CancellationFlag, EventKind, HttpWebhook, Notifier};

/// On-disk form of the run configuration (`provisioner.toml`).
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigFile {
    /// Tolerate duplicate-key conflicts when creating entries.
    pub tolerate_conflicts: bool,
    /// Categories to run.  Empty means all.
    pub include: Vec<String>,
    /// Categories never to run.
    pub exclude: Vec<String>,
    /// Overrides for template parameters.
    pub parameters: BTreeMap<String, String>,
    /// Lifecycle webhooks.
    pub webhooks: Vec<WebhookConfig>,
}

/// One `[[webhooks]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Endpoint receiving a JSON POST per event.
    pub url: String,
    /// Event tags to deliver.  Empty means all.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Options for one apply or extract run.
#[derive(Debug, Default)]
pub struct RunConfig {
    /// Categories whose handlers may run.
    pub categories: CategorySet,
    /// Whether handlers may skip duplicate-key conflicts instead of failing.
    pub tolerate_conflicts: bool,
    /// Parameter values overriding the template's defaults.
    pub parameters: BTreeMap<String, String>,
    /// Progress, message and webhook sinks.
    pub notifier: Notifier,
    /// Checked before each handler.
    pub cancel: CancellationFlag,
}

impl RunConfig {
    /// Every category, no conflict tolerance, no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the run configuration from a TOML file.  A missing file gives
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or names an unknown
    /// category or event.
    pub fn load(path: &Path) -> Result<Self> {
        let file: RunConfigFile = toml_loader::load_config(path)?;
        Self::from_file(file)
            .with_context(|| format!("Invalid run configuration: {}", path.display()))
    }

    /// Build a run configuration from its parsed file form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown category or event tags.
    pub fn from_file(file: RunConfigFile) -> Result<Self, ConfigError> {
        let mut notifier = Notifier::new();
        for hook in file.webhooks {
            let events = hook
                .events
                .iter()
                .map(|tag| EventKind::from_tag(tag))
                .collect::<Result<Vec<_>, _>>()?;
            notifier = notifier.with_webhook(HttpWebhook::new(hook.url, events));
        }
        Self {
            categories: CategorySet::all(),
            tolerate_conflicts: file.tolerate_conflicts,
            parameters: file.parameters,
            notifier,
            cancel: CancellationFlag::new(),
        }
        .narrow(&file.include, &file.exclude)
    }

    /// Restrict the enabled categories: when `only` is non-empty, keep just
    /// those; then drop everything in `skip`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCategory`] for an unknown tag.
    pub fn narrow<S: AsRef<str>>(mut self, only: &[S], skip: &[S]) -> Result<Self, ConfigError> {
        if !only.is_empty() {
            let allowed = only
                .iter()
                .map(|tag| Category::from_tag(tag.as_ref()))
                .collect::<Result<CategorySet, _>>()?;
            self.categories = self.categories.iter().filter(|c| allowed.contains(*c)).collect();
        }
        for tag in skip {
            self.categories = self.categories.without(Category::from_tag(tag.as_ref())?);
        }
        Ok(self)
    }

    /// Replace the enabled categories.
    #[must_use]
    pub const fn with_categories(mut self, categories: CategorySet) -> Self {
        self.categories = categories;
        self
    }

    /// Set the conflict tolerance flag.
    #[must_use]
    pub const fn tolerate_conflicts(mut self, tolerate: bool) -> Self {
        self.tolerate_conflicts = tolerate;
        self
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }
}
