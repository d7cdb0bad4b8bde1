//! Domain-specific error types for the provisioning engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`TokenError`], [`TargetError`])
//! while handler code and command handlers at the CLI boundary work with
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ProvisionError
//! ├── Config(ConfigError)     : run configuration and template file loading
//! ├── Token(TokenError)       : invalid token definitions
//! ├── Target(TargetError)     : live target reads and writes
//! └── Pipeline(PipelineError) : orchestration (cancellation, handler order)
//! ```
//!
//! There is no handler-fault variant: the orchestrator returns a failing
//! handler's own error to the caller unchanged.

use thiserror::Error;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Configuration-related error (parsing, I/O).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Token definition error.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Target read/write error.
    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    /// Pipeline orchestration error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Errors that arise from loading run configuration and template files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A category tag in the run configuration is not recognised.
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// A webhook event name in the run configuration is not recognised.
    #[error("unknown webhook event '{0}'")]
    UnknownEvent(String),

    /// An I/O error occurred while reading or writing a file.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path to the file that could not be accessed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise from token definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// An alias must be non-empty and start with a token marker (`{` or `~`).
    #[error("invalid token alias '{0}': must start with '{{' or '~'")]
    InvalidAlias(String),

    /// A token definition was created without any alias.
    #[error("token definition for value '{0}' has no aliases")]
    NoAliases(String),
}

/// Errors that arise from reading or writing the live target.
#[derive(Error, Debug)]
pub enum TargetError {
    /// An entry with the same identity key already exists.
    #[error("{category} entry '{key}' already exists")]
    Conflict {
        /// Resource category of the conflicting entry.
        category: String,
        /// Identity key of the conflicting entry.
        key: String,
    },

    /// The addressed entry does not exist.
    #[error("{category} entry '{key}' not found")]
    NotFound {
        /// Resource category that was searched.
        category: String,
        /// Identity key that was not found.
        key: String,
    },

    /// An entry carries no identity key (`name`, `title`, `key` or `url`).
    #[error("{category} entry has no identity key")]
    MissingKey {
        /// Resource category of the entry.
        category: String,
    },

    /// The target's backing store could not be read or written.
    #[error("IO error on target {path}: {source}")]
    Io {
        /// Path of the backing store.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The target's backing store is not valid JSON.
    #[error("invalid target document {path}: {source}")]
    Parse {
        /// Path of the backing store.
        path: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

impl TargetError {
    /// Whether this error is a duplicate-key conflict that a handler may
    /// tolerate when re-applying a template.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors raised by the orchestrator itself.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The run was cancelled before the named handler started.
    #[error("run cancelled before handler '{before}'")]
    Cancelled {
        /// Internal name of the handler that did not start.
        before: String,
    },

    /// The handler dependency declarations form a cycle.
    #[error("handler dependencies contain a cycle")]
    DependencyCycle,

    /// A handler is sequenced before a handler it depends on.
    #[error("handler '{handler}' must run after '{dependency}'")]
    OutOfOrder {
        /// Internal name of the dependent handler.
        handler: String,
        /// Internal name of the dependency sequenced after it.
        dependency: String,
    },
}
