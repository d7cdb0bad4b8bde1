//! In-memory target.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{ID_FIELD, Target, TargetDocument, stable_id};
use crate::error::TargetError;
use crate::template::{Entry, identity_key};

/// A target whose entries live in memory.
///
/// Counts every successful write so callers can check that a second apply
/// of an unchanged template converges without touching the target.
#[derive(Debug)]
pub struct MemoryTarget {
    url: String,
    id: String,
    title: String,
    sections: Mutex<BTreeMap<String, Vec<Entry>>>,
    writes: AtomicUsize,
}

impl MemoryTarget {
    /// Create an empty target; its id is derived from the URL.
    #[must_use]
    pub fn new(url: &str, title: &str) -> Self {
        let url = url.trim_end_matches('/');
        Self::from_document(TargetDocument {
            url: url.to_string(),
            id: stable_id(&[url]),
            title: title.to_string(),
            sections: BTreeMap::new(),
        })
    }

    /// Create a target holding the document's entries.
    #[must_use]
    pub fn from_document(doc: TargetDocument) -> Self {
        Self {
            url: doc.url,
            id: doc.id,
            title: doc.title,
            sections: Mutex::new(doc.sections),
            writes: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn to_document(&self) -> TargetDocument {
        TargetDocument {
            url: self.url.clone(),
            id: self.id.clone(),
            title: self.title.clone(),
            sections: self.lock().clone(),
        }
    }

    /// Number of successful `create` and `update` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Entry>>> {
        self.sections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn position(entries: &[Entry], key: &str) -> Option<usize> {
        entries.iter().position(|e| {
            identity_key(e).is_some_and(|k| k.eq_ignore_ascii_case(key))
        })
    }

    fn stamp(&self, category: &str, key: &str, entry: &Entry) -> (String, Entry) {
        let id = entry
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map_or_else(|| stable_id(&[&self.url, category, key]), str::to_string);
        let mut stored = entry.clone();
        stored.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        (id, stored)
    }
}

impl Target for MemoryTarget {
    fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn entries(&self, category: &str) -> Result<Vec<Entry>, TargetError> {
        Ok(self.lock().get(category).cloned().unwrap_or_default())
    }

    fn find(&self, category: &str, key: &str) -> Result<Option<Entry>, TargetError> {
        let sections = self.lock();
        Ok(sections.get(category).and_then(|entries| {
            Self::position(entries, key).and_then(|i| entries.get(i).cloned())
        }))
    }

    fn create(&self, category: &str, entry: &Entry) -> Result<String, TargetError> {
        let key = identity_key(entry).ok_or_else(|| TargetError::MissingKey {
            category: category.to_string(),
        })?;
        let mut sections = self.lock();
        let entries = sections.entry(category.to_string()).or_default();
        if Self::position(entries, key).is_some() {
            return Err(TargetError::Conflict {
                category: category.to_string(),
                key: key.to_string(),
            });
        }
        let (id, stored) = self.stamp(category, key, entry);
        entries.push(stored);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn update(&self, category: &str, key: &str, entry: &Entry) -> Result<String, TargetError> {
        let mut sections = self.lock();
        let not_found = || TargetError::NotFound {
            category: category.to_string(),
            key: key.to_string(),
        };
        let entries = sections.get_mut(category).ok_or_else(not_found)?;
        let slot = Self::position(entries, key)
            .and_then(|i| entries.get_mut(i))
            .ok_or_else(not_found)?;
        let existing_id = slot.get(ID_FIELD).cloned();
        let mut stored = entry.clone();
        if let Some(id) = existing_id {
            stored.insert(ID_FIELD.to_string(), id);
        }
        let (id, stored) = self.stamp(category, key, &stored);
        *slot = stored;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }
}
