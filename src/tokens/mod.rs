//! Token registry and substitution engine.
//!
//! Template strings carry placeholders such as `{site}/Lists/Tasks` or
//! `{listid:{parameter:TaskList}}`.  A [`TokenContext`] owns the alias table
//! for one run and rewrites such strings against it; handlers extend it as
//! they create resources whose identifiers later entries reference.

mod context;
mod registry;
pub mod scanner;

pub use context::{Scope, TokenContext};
pub use registry::{TokenDefinition, TokenScope};
