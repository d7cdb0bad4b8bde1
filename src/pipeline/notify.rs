//! Caller-facing notifications: progress, messages and lifecycle webhooks.
//!
//! All notifications are synchronous and best-effort.  A failing webhook is
//! logged and otherwise ignored; it never affects the run.
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Severity of a caller-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Routine progress information.
    Info,
    /// Something was skipped or tolerated.
    Warning,
    /// The run is about to fail.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Template → target.
    Apply,
    /// Target → template.
    Extract,
}

impl Operation {
    /// Lowercase name used in logs and webhook bodies.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Extract => "extract",
        }
    }
}

/// Kind of a [`LifecycleEvent`], used to filter webhook subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The run is about to start its first handler.
    RunStarted,
    /// Every applicable handler finished.
    RunCompleted,
    /// A handler is about to run.
    HandlerStarted,
    /// A handler finished without error.
    HandlerCompleted,
    /// A handler (or the run) failed.
    ExceptionOccurred,
}

impl EventKind {
    /// Every kind.
    pub const ALL: [Self; 5] = [
        Self::RunStarted,
        Self::RunCompleted,
        Self::HandlerStarted,
        Self::HandlerCompleted,
        Self::ExceptionOccurred,
    ];

    /// Tag used in config files and webhook bodies.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::RunStarted => "run-started",
            Self::RunCompleted => "run-completed",
            Self::HandlerStarted => "handler-started",
            Self::HandlerCompleted => "handler-completed",
            Self::ExceptionOccurred => "exception-occurred",
        }
    }

    /// Parse a tag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEvent`] for an unrecognised tag.
    pub fn from_tag(tag: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag().eq_ignore_ascii_case(tag.trim()))
            .ok_or_else(|| ConfigError::UnknownEvent(tag.to_string()))
    }
}

/// A lifecycle notification.  Handlers are named by their internal name.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    /// See [`EventKind::RunStarted`].
    RunStarted {
        /// Direction of the run.
        operation: Operation,
    },
    /// See [`EventKind::RunCompleted`].
    RunCompleted {
        /// Direction of the run.
        operation: Operation,
    },
    /// See [`EventKind::HandlerStarted`].
    HandlerStarted {
        /// Internal name of the handler.
        handler: &'a str,
    },
    /// See [`EventKind::HandlerCompleted`].
    HandlerCompleted {
        /// Internal name of the handler.
        handler: &'a str,
    },
    /// See [`EventKind::ExceptionOccurred`].
    ExceptionOccurred {
        /// Internal name of the failing handler.
        handler: &'a str,
        /// The error, exactly as the handler returned it.
        error: &'a anyhow::Error,
    },
}

impl LifecycleEvent<'_> {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::RunStarted { .. } => EventKind::RunStarted,
            Self::RunCompleted { .. } => EventKind::RunCompleted,
            Self::HandlerStarted { .. } => EventKind::HandlerStarted,
            Self::HandlerCompleted { .. } => EventKind::HandlerCompleted,
            Self::ExceptionOccurred { .. } => EventKind::ExceptionOccurred,
        }
    }

    /// Internal name of the handler the event is about, if any.
    #[must_use]
    pub const fn handler(&self) -> Option<&str> {
        match self {
            Self::HandlerStarted { handler }
            | Self::HandlerCompleted { handler }
            | Self::ExceptionOccurred { handler, .. } => Some(*handler),
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
        }
    }

    /// JSON body posted by [`HttpWebhook`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert("event".into(), self.kind().tag().into());
        match self {
            Self::RunStarted { operation } | Self::RunCompleted { operation } => {
                body.insert("operation".into(), operation.tag().into());
            }
            Self::HandlerStarted { handler } | Self::HandlerCompleted { handler } => {
                body.insert("handler".into(), (*handler).into());
            }
            Self::ExceptionOccurred { handler, error } => {
                body.insert("handler".into(), (*handler).into());
                body.insert("error".into(), format!("{error:#}").into());
            }
        }
        serde_json::Value::Object(body)
    }
}

/// Receiver of lifecycle events.
pub trait Webhook: Send + Sync {
    /// Deliver one event.  Must not fail the caller.
    fn send(&self, event: &LifecycleEvent<'_>);
}

/// Progress callback: `(handler display name, step, total)`.
pub type ProgressFn = Box<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Message callback: `(text, severity)`.
pub type MessageFn = Box<dyn Fn(&str, Severity) + Send + Sync>;

/// The set of caller callbacks for one run.
#[derive(Default)]
pub struct Notifier {
    progress: Option<ProgressFn>,
    message: Option<MessageFn>,
    webhooks: Vec<Box<dyn Webhook>>,
}

impl Notifier {
    /// A notifier that drops everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress callback.
    #[must_use]
    pub fn on_progress(mut self, f: impl Fn(&str, usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Set the message callback.
    #[must_use]
    pub fn on_message(mut self, f: impl Fn(&str, Severity) + Send + Sync + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    /// Add a webhook.
    #[must_use]
    pub fn with_webhook(mut self, hook: impl Webhook + 'static) -> Self {
        self.webhooks.push(Box::new(hook));
        self
    }

    /// Number of registered webhooks.
    #[must_use]
    pub fn webhook_count(&self) -> usize {
        self.webhooks.len()
    }

    /// Report progress.
    pub fn progress(&self, handler: &str, step: usize, total: usize) {
        if let Some(f) = &self.progress {
            f(handler, step, total);
        }
    }

    /// Send a caller-facing message.
    pub fn message(&self, text: &str, severity: Severity) {
        if let Some(f) = &self.message {
            f(text, severity);
        }
    }

    /// Dispatch a lifecycle event to every webhook.
    pub fn lifecycle(&self, event: &LifecycleEvent<'_>) {
        for hook in &self.webhooks {
            hook.send(event);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("progress", &self.progress.is_some())
            .field("message", &self.message.is_some())
            .field("webhooks", &self.webhooks.len())
            .finish()
    }
}

/// Posts lifecycle events as JSON to an HTTP endpoint.
pub struct HttpWebhook {
    url: String,
    events: Vec<EventKind>,
    agent: ureq::Agent,
}

impl HttpWebhook {
    /// Timeout for one delivery.
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a webhook for `url`.  An empty `events` list subscribes to
    /// every kind.
    #[must_use]
    pub fn new(url: impl Into<String>, events: Vec<EventKind>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Self::TIMEOUT))
            .build();
        Self {
            url: url.into(),
            events,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Returns `true` if this webhook receives events of `kind`.
    #[must_use]
    pub fn accepts(&self, kind: EventKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }
}

impl Webhook for HttpWebhook {
    fn send(&self, event: &LifecycleEvent<'_>) {
        if !self.accepts(event.kind()) {
            return;
        }
        let body = event.to_json().to_string();
        let result = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json")
            .send(body.as_str());
        match result {
            Ok(_) => tracing::debug!(url = %self.url, event = event.kind().tag(), "webhook delivered"),
            Err(e) => tracing::warn!(url = %self.url, event = event.kind().tag(), "webhook failed: {e}"),
        }
    }
}

impl fmt::Debug for HttpWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpWebhook")
            .field("url", &self.url)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
