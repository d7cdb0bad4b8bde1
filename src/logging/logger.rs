//! Structured logger with per-handler summary collection.
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use super::subscriber::{PROGRESS_TARGET, STAGE_TARGET};
use super::types::{HandlerEntry, HandlerStatus, Log};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with summary collection.
///
/// All messages are also written to a persistent log file at
/// `$XDG_CACHE_HOME/provisioner/<command>.log` by the file layer installed
/// in [`init_subscriber`](super::subscriber::init_subscriber).
#[derive(Debug)]
pub struct Logger {
    handlers: Mutex<Vec<HandlerEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger for `command`.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded handler entries.
    #[must_use]
    pub fn handler_entries(&self) -> Vec<HandlerEntry> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message.
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log one progress step, e.g. `[2/5] Lists`.
    pub fn progress(&self, name: &str, step: usize, total: usize) {
        tracing::info!(target: PROGRESS_TARGET, "[{step}/{total}] {name}");
    }

    /// Record a handler result for the summary.
    pub fn record_handler(&self, name: &str, status: HandlerStatus, message: Option<&str>) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HandlerEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
    }

    /// Count the handlers that faulted.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.handler_entries()
            .iter()
            .filter(|h| h.status == HandlerStatus::Faulted)
            .count()
    }

    /// Print the summary of all recorded handlers.
    pub fn print_summary(&self) {
        let entries = self.handler_entries();
        if entries.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut done = 0u32;
        let mut not_applicable = 0u32;
        let mut faulted = 0u32;

        for entry in &entries {
            let (icon, color) = match entry.status {
                HandlerStatus::Applied | HandlerStatus::Extracted => {
                    done += 1;
                    ("✓", "\x1b[32m")
                }
                HandlerStatus::NotApplicable => {
                    not_applicable += 1;
                    ("·", "\x1b[2m")
                }
                HandlerStatus::Faulted => {
                    faulted += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.name));
        }

        let total = done + not_applicable + faulted;
        self.info(&format!(
            "{total} handlers: \x1b[32m{done} done\x1b[0m, \x1b[2m{not_applicable} n/a\x1b[0m, \x1b[31m{faulted} faulted\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error);

    fn record_handler(&self, name: &str, status: HandlerStatus, message: Option<&str>) {
        self.record_handler(name, status, message);
    }
}
