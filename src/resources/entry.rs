//! Keyed template entry resource.
use anyhow::Result;

use super::{Resource, ResourceChange, ResourceState};
use crate::target::{ID_FIELD, Target};
use crate::template::{Entry, identity_key};

/// A single resolved template entry that should exist on the target.
///
/// The entry is matched against the target by its identity key.  The
/// target-assigned `id` field never counts as a difference.
#[derive(Debug)]
pub struct EntryResource<'a> {
    target: &'a dyn Target,
    category: &'a str,
    key: Option<String>,
    desired: Entry,
    insert_only: bool,
}

impl<'a> EntryResource<'a> {
    /// Create a resource for `desired` in `category`.
    #[must_use]
    pub fn new(target: &'a dyn Target, category: &'a str, desired: Entry) -> Self {
        let key = identity_key(&desired).map(str::to_string);
        Self {
            target,
            category,
            key,
            desired,
            insert_only: false,
        }
    }

    /// Make [`apply`](Resource::apply) always create, so an existing entry
    /// with the same key surfaces as [`TargetError::Conflict`].
    ///
    /// [`TargetError::Conflict`]: crate::error::TargetError::Conflict
    #[must_use]
    pub const fn insert_only(mut self) -> Self {
        self.insert_only = true;
        self
    }

    /// Identity key of the desired entry, if it has one.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Identifier the target assigned to this entry, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read.
    pub fn id(&self) -> Result<Option<String>> {
        let Some(key) = self.key.as_deref() else {
            return Ok(None);
        };
        Ok(entry_id(self.target, self.category, key)?)
    }
}

impl Resource for EntryResource<'_> {
    fn description(&self) -> String {
        format!(
            "{} '{}'",
            self.category,
            self.key.as_deref().unwrap_or("<unnamed>")
        )
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(key) = self.key.as_deref() else {
            return Ok(ResourceState::Invalid {
                reason: "entry has no identity key".to_string(),
            });
        };
        let Some(current) = self.target.find(self.category, key)? else {
            return Ok(ResourceState::Missing);
        };
        if without_id(&current) == without_id(&self.desired) {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: serde_json::Value::Object(current).to_string(),
            })
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        let Some(key) = self.key.as_deref() else {
            return Ok(ResourceChange::Skipped {
                reason: "entry has no identity key".to_string(),
            });
        };
        if !self.insert_only && self.target.find(self.category, key)?.is_some() {
            self.target.update(self.category, key, &self.desired)?;
        } else {
            self.target.create(self.category, &self.desired)?;
        }
        Ok(ResourceChange::Applied)
    }
}

/// Identifier of the entry of `category` keyed `key`, if it exists.
///
/// # Errors
///
/// Returns an error if the target cannot be read.
pub fn entry_id(
    target: &dyn Target,
    category: &str,
    key: &str,
) -> Result<Option<String>, crate::error::TargetError> {
    Ok(target.find(category, key)?.and_then(|entry| {
        entry
            .get(ID_FIELD)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }))
}

fn without_id(entry: &Entry) -> Entry {
    let mut copy = entry.clone();
    copy.remove(ID_FIELD);
    copy
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::TargetError;
    use crate::target::{MemoryTarget, MockTarget};
    use crate::template::test_helpers::entry;
    use serde_json::json;

    fn target() -> MemoryTarget {
        MemoryTarget::new("https://contoso.example/sites/dev", "Dev")
    }

    #[test]
    fn missing_then_correct_after_apply() {
        let t = target();
        let res = EntryResource::new(&t, "lists", entry(json!({"title": "Tasks"})));
        assert_eq!(res.current_state().unwrap(), ResourceState::Missing);
        assert_eq!(res.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(res.current_state().unwrap(), ResourceState::Correct);
        assert!(res.id().unwrap().is_some());
    }

    #[test]
    fn differing_body_is_incorrect_and_update_keeps_id() {
        let t = target();
        let first = EntryResource::new(&t, "lists", entry(json!({"title": "Tasks", "hidden": false})));
        first.apply().unwrap();
        let id = first.id().unwrap();

        let second = EntryResource::new(&t, "lists", entry(json!({"title": "Tasks", "hidden": true})));
        assert!(matches!(
            second.current_state().unwrap(),
            ResourceState::Incorrect { .. }
        ));
        second.apply().unwrap();
        assert_eq!(second.current_state().unwrap(), ResourceState::Correct);
        assert_eq!(second.id().unwrap(), id);
    }

    #[test]
    fn entry_without_key_is_invalid() {
        let t = target();
        let res = EntryResource::new(&t, "fields", entry(json!({"type": "Text"})));
        assert!(matches!(
            res.current_state().unwrap(),
            ResourceState::Invalid { .. }
        ));
        assert!(matches!(res.apply().unwrap(), ResourceChange::Skipped { .. }));
        assert_eq!(res.description(), "fields '<unnamed>'");
    }

    #[test]
    fn read_failure_propagates() {
        let mut mock = MockTarget::new();
        mock.expect_find().returning(|category, _| {
            Err(TargetError::NotFound {
                category: category.to_string(),
                key: "backing store".to_string(),
            })
        });
        let res = EntryResource::new(&mock, "lists", entry(json!({"title": "Tasks"})));
        let err = res.current_state().unwrap_err();
        assert!(err.downcast_ref::<TargetError>().is_some());
    }

    #[test]
    fn create_conflict_surfaces_as_target_error() {
        let mut mock = MockTarget::new();
        mock.expect_find().returning(|_, _| Ok(None));
        mock.expect_create().times(1).returning(|category, _| {
            Err(TargetError::Conflict {
                category: category.to_string(),
                key: "Row 1".to_string(),
            })
        });
        let res = EntryResource::new(&mock, "list-items", entry(json!({"title": "Row 1"})));
        let err = res.apply().unwrap_err();
        assert!(
            err.downcast_ref::<TargetError>()
                .is_some_and(TargetError::is_conflict)
        );
    }

    #[test]
    fn insert_only_never_updates() {
        let t = target();
        let row = entry(json!({"title": "Row 1"}));
        EntryResource::new(&t, "list-items", row.clone())
            .insert_only()
            .apply()
            .unwrap();

        let err = EntryResource::new(&t, "list-items", row)
            .insert_only()
            .apply()
            .unwrap_err();

        assert!(
            err.downcast_ref::<TargetError>()
                .is_some_and(TargetError::is_conflict)
        );
        assert_eq!(t.writes(), 1);
    }
}
