//! Core logging types: handler entries, status, and the [`Log`] trait.

/// Handler outcome for summary reporting.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    /// Display name of the handler.
    pub name: String,
    /// Final status of the handler.
    pub status: HandlerStatus,
    /// Optional detail (skip reason or error description).
    pub message: Option<String>,
}

/// Terminal state of a handler within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Apply completed.
    Applied,
    /// Extract completed.
    Extracted,
    /// Category disabled or applicability check returned `false`.
    NotApplicable,
    /// The handler (or its applicability check) failed and aborted the run.
    Faulted,
}

/// Abstraction over logging backends.
///
/// The orchestrator and commands log through this trait so tests can swap
/// in a recording implementation.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Record a handler result for the summary.
    fn record_handler(&self, name: &str, status: HandlerStatus, message: Option<&str>);
}
