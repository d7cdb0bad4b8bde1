//! Idempotent resource primitives (check + apply pattern).
//!
//! Every handler converges a target the same way: build one [`Resource`] per
//! template entry, ask it for its [`ResourceState`], and apply it only when
//! the state is [`Missing`](ResourceState::Missing) or
//! [`Incorrect`](ResourceState::Incorrect).
pub mod entry;

pub use entry::EntryResource;

use anyhow::Result;

/// State of a resource on the target.
///
/// # Examples
///
/// ```
/// use provisioner::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let correct = ResourceState::Correct;
/// let wrong = ResourceState::Incorrect { current: "{\"title\":\"Old\"}".into() };
/// let skip = ResourceState::Invalid { reason: "entry has no identity key".into() };
///
/// assert_ne!(missing, correct);
/// assert_eq!(correct, ResourceState::Correct);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// The entry does not exist on the target.
    Missing,
    /// The entry exists and matches the desired state.
    Correct,
    /// The entry exists but differs from the desired state.
    Incorrect {
        /// The current value of the entry, serialized.
        current: String,
    },
    /// The entry cannot be applied (e.g. it carries no identity key).
    Invalid {
        /// Reason why the entry cannot be applied.
        reason: String,
    },
}

/// Result of applying a resource change.
///
/// # Examples
///
/// ```
/// use provisioner::resources::ResourceChange;
///
/// let applied = ResourceChange::Applied;
/// let noop = ResourceChange::AlreadyCorrect;
/// let skipped = ResourceChange::Skipped { reason: "duplicate row".into() };
///
/// assert_eq!(applied, ResourceChange::Applied);
/// assert_ne!(applied, noop);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// The entry was created or updated.
    Applied,
    /// The entry was already correct (no change needed).
    AlreadyCorrect,
    /// The entry was skipped.
    Skipped {
        /// Reason why the entry was skipped.
        reason: String,
    },
}

/// Unified interface for resources that can be checked and applied.
///
/// # Examples
///
/// ```ignore
/// // All resources follow the same check-then-apply pattern:
/// if resource.needs_change()? {
///     resource.apply()?;
/// }
/// ```
pub trait Resource {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Check the current state of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read.
    fn current_state(&self) -> Result<ResourceState>;

    /// Bring the resource to its desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the target rejects the write, for instance with
    /// a duplicate-key conflict.
    fn apply(&self) -> Result<ResourceChange>;

    /// Determine if the resource needs to be changed.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`current_state`](Self::current_state).
    fn needs_change(&self) -> Result<bool> {
        Ok(matches!(
            self.current_state()?,
            ResourceState::Missing | ResourceState::Incorrect { .. }
        ))
    }
}
