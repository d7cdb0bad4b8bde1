//! The live resource a template is applied to or extracted from.
//!
//! Transport and authentication are out of scope; a [`Target`] is anything
//! that can list, look up, create and update keyed entries per category.
//! [`MemoryTarget`] keeps them in memory and [`JsonTarget`] persists them to
//! a JSON document on disk.

mod json;
mod memory;

pub use json::JsonTarget;
pub use memory::MemoryTarget;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::TargetError;
use crate::template::Entry;

/// Field under which a target stores the identifier it assigned an entry.
pub const ID_FIELD: &str = "id";

/// A live, stateful target.
///
/// Methods take `&self`; implementations that mutate use interior
/// mutability.  Identity keys are compared case-insensitively.
#[cfg_attr(test, mockall::automock)]
pub trait Target {
    /// Absolute URL of the target's root site.
    fn url(&self) -> &str;

    /// Identifier of the root site.
    fn id(&self) -> &str;

    /// Display title of the root site.
    fn title(&self) -> &str;

    /// All entries of a category, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read.
    fn entries(&self, category: &str) -> Result<Vec<Entry>, TargetError>;

    /// The entry of `category` whose identity key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read.
    fn find(&self, category: &str, key: &str) -> Result<Option<Entry>, TargetError>;

    /// Create an entry and return the identifier assigned to it.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Conflict`] if an entry with the same identity
    /// key exists, or [`TargetError::MissingKey`] if the entry has none.
    fn create(&self, category: &str, entry: &Entry) -> Result<String, TargetError>;

    /// Replace the entry identified by `key` and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::NotFound`] if no such entry exists.
    fn update(&self, category: &str, key: &str, entry: &Entry) -> Result<String, TargetError>;
}

impl std::fmt::Debug for dyn Target + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target").field("url", &self.url()).finish()
    }
}

/// Serialized form of a target: root-site metadata plus entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDocument {
    /// Absolute URL of the root site.
    pub url: String,
    /// Identifier of the root site.
    pub id: String,
    /// Display title of the root site.
    #[serde(default)]
    pub title: String,
    /// Entries keyed by category tag.
    #[serde(default)]
    pub sections: BTreeMap<String, Vec<Entry>>,
}

/// Derive a stable GUID-shaped identifier from its parts.
///
/// The same parts always produce the same identifier, so repeated runs
/// against fresh targets assign identical ids.
///
/// # Examples
///
/// ```
/// use provisioner::target::stable_id;
/// use provisioner::tokens::scanner::is_guid;
///
/// let id = stable_id(&["https://contoso.example", "lists", "tasks"]);
/// assert!(is_guid(&id));
/// assert_eq!(id, stable_id(&["https://contoso.example", "lists", "tasks"]));
/// ```
#[must_use]
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.to_lowercase().as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let hex: String = digest
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect();
    let groups = [(0, 8), (8, 12), (12, 16), (16, 20), (20, 32)];
    groups
        .iter()
        .filter_map(|&(start, end)| hex.get(start..end))
        .collect::<Vec<_>>()
        .join("-")
}
