//! Portable templates: parameters plus one list of entries per category.
//!
//! The engine treats entries as opaque JSON objects.  Only the identity key
//! (see [`identity_key`]) has meaning outside the handler that owns a
//! category.

pub mod delta;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// One resource entry: an arbitrary JSON object.
pub type Entry = Map<String, Value>;

/// Fields consulted, in order, for an entry's identity.
pub const IDENTITY_FIELDS: [&str; 4] = ["name", "title", "key", "url"];

/// A template document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    /// Default values for `{parameter:NAME}` tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    /// Entries keyed by category tag (`fields`, `lists`, …).
    #[serde(default)]
    pub sections: BTreeMap<String, Vec<Entry>>,
}

impl Template {
    /// Load a template from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid template.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse template: {}", path.display()))
    }

    /// Write the template to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self).context("Failed to serialize template")?;
        json.push('\n');
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write template: {}", path.display()))
    }

    /// Entries of one category; empty if the section is absent.
    #[must_use]
    pub fn section(&self, category: &str) -> &[Entry] {
        self.sections
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable entries of one category, creating the section if needed.
    pub fn section_mut(&mut self, category: &str) -> &mut Vec<Entry> {
        self.sections.entry(category.to_string()).or_default()
    }

    /// Replace a category's entries.  An empty list removes the section.
    pub fn set_section(&mut self, category: &str, entries: Vec<Entry>) {
        if entries.is_empty() {
            self.sections.remove(category);
        } else {
            self.sections.insert(category.to_string(), entries);
        }
    }

    /// Returns `true` if the category has at least one entry.
    #[must_use]
    pub fn has_section(&self, category: &str) -> bool {
        !self.section(category).is_empty()
    }

    /// Total number of entries across all sections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

/// The identity of an entry: the first string among [`IDENTITY_FIELDS`].
#[must_use]
pub fn identity_key(entry: &Entry) -> Option<&str> {
    IDENTITY_FIELDS
        .iter()
        .find_map(|field| entry.get(*field).and_then(Value::as_str))
}

/// Read a string field of an entry.
#[must_use]
pub fn str_field<'a>(entry: &'a Entry, field: &str) -> Option<&'a str> {
    entry.get(field).and_then(Value::as_str)
}
