//! Resource-category handlers and the contract the orchestrator drives.
pub mod fields;
pub mod graph;
pub mod helpers;
pub mod list_items;
pub mod lists;
pub mod navigation;
pub mod property_bag;
pub mod subsites;

/// Implement [`Handler::dependencies`] by expanding to the required
/// `fn dependencies(&self) -> &[TypeId]` method body.
///
/// The `const DEPS` intermediate gives the slice the `'static` lifetime the
/// return type requires.
///
/// # Examples
///
/// ```ignore
/// handler_deps![super::lists::ProvisionLists]
/// // expands to:
/// //   fn dependencies(&self) -> &[std::any::TypeId] {
/// //       const DEPS: &[std::any::TypeId] = &[
/// //           std::any::TypeId::of::<super::lists::ProvisionLists>(),
/// //       ];
/// //       DEPS
/// //   }
/// ```
macro_rules! handler_deps {
    [$($dep:ty),+ $(,)?] => {
        fn dependencies(&self) -> &[std::any::TypeId] {
            const DEPS: &[std::any::TypeId] = &[$(std::any::TypeId::of::<$dep>()),+];
            DEPS
        }
    };
}

pub(crate) use handler_deps;

pub use helpers::{HandlerStats, ProcessOpts};

use std::any::TypeId;

use anyhow::Result;

use crate::config::{Category, RunConfig};
use crate::target::Target;
use crate::template::Template;
use crate::tokens::TokenContext;

/// A resource-category handler.
///
/// Handlers are stateless.  The orchestrator calls each applicability
/// check at most once per run and remembers the answer, so a check may
/// read from the target.
///
/// The `'static` bound gives each handler a stable [`TypeId`], which
/// [`dependencies`](Self::dependencies) declarations refer to.
pub trait Handler: Send + Sync + 'static {
    /// Display name used in messages and progress.
    fn name(&self) -> &str;

    /// Routing key used in lifecycle notifications.
    fn internal_name(&self) -> &str;

    /// The category that enables or disables this handler.
    fn category(&self) -> Category;

    /// The concrete `TypeId` of this handler.
    fn handler_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Handlers that must come earlier in the sequence.
    fn dependencies(&self) -> &[TypeId] {
        &[]
    }

    /// Whether this handler counts toward the run's progress total.
    fn reports_progress(&self) -> bool {
        true
    }

    /// Whether apply has anything to do for this template.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be inspected.
    fn will_apply(&self, target: &dyn Target, template: &Template, config: &RunConfig)
    -> Result<bool>;

    /// Whether extract has anything to read from this target.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be inspected.
    fn will_extract(
        &self,
        target: &dyn Target,
        template: &Template,
        config: &RunConfig,
    ) -> Result<bool>;

    /// Provision this category's entries, registering any tokens later
    /// handlers may reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the target rejects a write that is not a
    /// tolerated conflict.
    fn apply(
        &self,
        target: &dyn Target,
        template: &mut Template,
        ctx: &mut TokenContext,
        config: &RunConfig,
    ) -> Result<()>;

    /// Read this category's entries into `template` in portable form.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read.
    fn extract(&self, target: &dyn Target, template: &mut Template, config: &RunConfig)
    -> Result<()>;
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.internal_name())
            .finish()
    }
}

/// Every handler in execution order.
///
/// A category owning identifiers comes before any category referencing
/// them by token; [`graph::order_violations`] checks this against the
/// declared dependencies.
pub static HANDLERS: [&dyn Handler; 6] = [
    &subsites::ProvisionSubsites,
    &fields::ProvisionFields,
    &lists::ProvisionLists,
    &list_items::ProvisionListItems,
    &navigation::ProvisionNavigation,
    &property_bag::ProvisionPropertyBag,
];

/// Default applicability for apply: the template has entries for the
/// handler's category.
#[must_use]
pub fn has_entries(template: &Template, category: Category) -> bool {
    template.has_section(category.tag())
}

/// Default applicability for extract: the target has entries for the
/// handler's category.
///
/// # Errors
///
/// Returns an error if the target cannot be read.
pub fn target_has_entries(target: &dyn Target, category: Category) -> Result<bool> {
    Ok(!target.entries(category.tag())?.is_empty())
}
