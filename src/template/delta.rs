//! Extraction delta: drop freshly extracted entries the base already has.
//!
//! Matching is shallow.  An entry is considered present in the base when an
//! entry of the same category carries the same identity key (compared
//! ASCII case-insensitively, as targets compare keys), whatever its other
//! attributes are.  Changes to an existing resource therefore never show up
//! in a delta.
use std::collections::HashSet;

use super::{Template, identity_key};

/// Remove from `extracted` every entry whose identity key appears in the
/// same category of `base`.  Sections left empty are removed.  Entries
/// without an identity key are always kept.
///
/// Returns the number of entries removed.
pub fn remove_unchanged(extracted: &mut Template, base: &Template) -> usize {
    let mut removed = 0;
    let categories: Vec<String> = extracted.sections.keys().cloned().collect();
    for category in categories {
        let known: HashSet<String> = base
            .section(&category)
            .iter()
            .filter_map(identity_key)
            .map(str::to_ascii_lowercase)
            .collect();
        if known.is_empty() {
            continue;
        }
        let entries = std::mem::take(extracted.section_mut(&category));
        let before = entries.len();
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|entry| {
                identity_key(entry).is_none_or(|key| !known.contains(&key.to_ascii_lowercase()))
            })
            .collect();
        removed += before - kept.len();
        tracing::debug!(
            category = %category,
            removed = before - kept.len(),
            kept = kept.len(),
            "delta cleanup"
        );
        extracted.set_section(&category, kept);
    }
    removed
}
