//! Cooperative cancellation between handlers.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

/// Shared flag the orchestrator checks before starting each handler.
///
/// Clones share the same flag.  A handler that is already running is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// A flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set this flag when the process receives Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if a Ctrl-C handler is already installed.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received; stopping after the current handler");
            flag.cancel();
        })
        .context("installing Ctrl-C handler")
    }
}
