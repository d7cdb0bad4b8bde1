//! Generic resource processing loop shared by the handlers: check state,
//! apply, tolerate conflicts, collect stats.  Also the shared extraction
//! routine.

use anyhow::Result;
use serde_json::Value;

use crate::config::{Category, RunConfig};
use crate::error::TargetError;
use crate::pipeline::Severity;
use crate::resources::{Resource, ResourceChange, ResourceState};
use crate::target::{ID_FIELD, Target};
use crate::template::{Entry, Template};
use crate::tokens::TokenContext;

/// Counters for handlers that process many entries.
///
/// # Examples
///
/// ```
/// use provisioner::handlers::HandlerStats;
///
/// let stats = HandlerStats { changed: 1, already_ok: 2, skipped: 3 };
/// assert_eq!(stats.summary(), "1 changed, 2 already ok, 3 skipped");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandlerStats {
    /// Entries created or updated.
    pub changed: u32,
    /// Entries already in the desired state.
    pub already_ok: u32,
    /// Entries skipped (invalid, unresolved tokens, tolerated conflicts).
    pub skipped: u32,
}

impl HandlerStats {
    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self) -> String {
        if self.skipped > 0 {
            format!(
                "{} changed, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} changed, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Report the summary through the run's message sink.
    pub fn report(&self, handler: &str, config: &RunConfig) {
        let text = format!("{handler}: {}", self.summary());
        tracing::debug!("{text}");
        config.notifier.message(&text, Severity::Info);
    }
}

impl std::ops::AddAssign for HandlerStats {
    fn add_assign(&mut self, other: Self) {
        self.changed += other.changed;
        self.already_ok += other.already_ok;
        self.skipped += other.skipped;
    }
}

/// Configuration for the processing loop.
///
/// # Examples
///
/// ```
/// use provisioner::handlers::ProcessOpts;
///
/// let opts = ProcessOpts::apply_all("provision field");
/// assert!(opts.fix_incorrect && opts.fix_missing && opts.probe);
///
/// let opts = ProcessOpts::insert_only("add row").tolerating(true);
/// assert!(!opts.probe && opts.tolerate_conflicts);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ProcessOpts<'a> {
    /// Verb for log messages (e.g. "provision list").
    pub verb: &'a str,
    /// Treat `Incorrect` as fixable (update the entry).
    pub fix_incorrect: bool,
    /// Treat `Missing` as fixable (create the entry).
    pub fix_missing: bool,
    /// Read the current state first.  When `false` every resource is
    /// assumed missing and written blindly.
    pub probe: bool,
    /// Count duplicate-key conflicts as skipped instead of failing.
    pub tolerate_conflicts: bool,
}

impl<'a> ProcessOpts<'a> {
    /// Create missing entries and update differing ones.
    #[must_use]
    pub const fn apply_all(verb: &'a str) -> Self {
        Self {
            verb,
            fix_incorrect: true,
            fix_missing: true,
            probe: true,
            tolerate_conflicts: false,
        }
    }

    /// Write every entry without reading the target first.
    #[must_use]
    pub const fn insert_only(verb: &'a str) -> Self {
        Self {
            verb,
            fix_incorrect: false,
            fix_missing: true,
            probe: false,
            tolerate_conflicts: false,
        }
    }

    /// Set conflict tolerance.
    #[must_use]
    pub const fn tolerating(mut self, tolerate: bool) -> Self {
        self.tolerate_conflicts = tolerate;
        self
    }
}

/// Log a warning and forward it to the run's message sink.
pub fn warn(config: &RunConfig, text: &str) {
    tracing::warn!("{text}");
    config.notifier.message(text, Severity::Warning);
}

/// Process every resource in order, failing on the first untolerated error.
///
/// # Errors
///
/// Returns the first error raised by a state check or by an apply that is
/// not a tolerated conflict.
pub fn process_resources<R: Resource>(
    config: &RunConfig,
    resources: impl IntoIterator<Item = R>,
    opts: &ProcessOpts<'_>,
) -> Result<HandlerStats> {
    let mut stats = HandlerStats::default();
    for resource in resources {
        stats += process_single(config, &resource, opts)?;
    }
    Ok(stats)
}

/// Process one resource, returning a stats delta.
///
/// # Errors
///
/// See [`process_resources`].
pub fn process_single<R: Resource>(
    config: &RunConfig,
    resource: &R,
    opts: &ProcessOpts<'_>,
) -> Result<HandlerStats> {
    let desc = resource.description();
    let state = if opts.probe {
        resource.current_state()?
    } else {
        ResourceState::Missing
    };
    let mut delta = HandlerStats::default();
    match state {
        ResourceState::Correct => {
            tracing::debug!("ok: {desc}");
            delta.already_ok += 1;
        }
        ResourceState::Invalid { reason } => {
            warn(config, &format!("skipping {desc}: {reason}"));
            delta.skipped += 1;
        }
        ResourceState::Missing if !opts.fix_missing => {
            delta.skipped += 1;
        }
        ResourceState::Incorrect { .. } if !opts.fix_incorrect => {
            tracing::debug!("skipping {desc} (exists with different values)");
            delta.skipped += 1;
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } => {
            delta += apply_resource(config, resource, opts)?;
        }
    }
    Ok(delta)
}

fn apply_resource<R: Resource>(
    config: &RunConfig,
    resource: &R,
    opts: &ProcessOpts<'_>,
) -> Result<HandlerStats> {
    let desc = resource.description();
    let mut delta = HandlerStats::default();
    match resource.apply() {
        Ok(ResourceChange::Applied) => {
            tracing::debug!("{}: {desc}", opts.verb);
            delta.changed += 1;
        }
        Ok(ResourceChange::AlreadyCorrect) => delta.already_ok += 1,
        Ok(ResourceChange::Skipped { reason }) => {
            warn(config, &format!("failed to {} {desc}: {reason}", opts.verb));
            delta.skipped += 1;
        }
        Err(e) if opts.tolerate_conflicts && is_conflict(&e) => {
            warn(config, &format!("tolerated conflict: {e}"));
            delta.skipped += 1;
        }
        Err(e) => return Err(e),
    }
    Ok(delta)
}

fn is_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TargetError>()
        .is_some_and(TargetError::is_conflict)
}

/// Resolve an entry and report whether tokens are left in it.
///
/// Returns `None` (after a warning) when the resolved entry still contains
/// tokens the context cannot resolve.
pub fn resolve_or_skip(
    ctx: &TokenContext,
    config: &RunConfig,
    category: Category,
    entry: &Entry,
) -> Option<Entry> {
    let resolved = ctx.resolve_entry(entry);
    let leftovers = ctx.unresolved_in_entry(&resolved);
    if leftovers.is_empty() {
        Some(resolved)
    } else {
        let key = crate::template::identity_key(entry).unwrap_or("<unnamed>");
        warn(
            config,
            &format!(
                "skipping {category} '{key}': unresolved tokens {}",
                leftovers.join(", ")
            ),
        );
        None
    }
}

/// Read every entry of `category`, drop fields named in `strip` plus the
/// target-assigned id, tokenize all strings, and store the result as the
/// template's section.
///
/// # Errors
///
/// Returns an error if the target cannot be read.
pub fn extract_section(
    target: &dyn Target,
    template: &mut Template,
    category: Category,
    strip: &[&str],
) -> Result<usize> {
    let ctx = TokenContext::for_target(target);
    let entries: Vec<Entry> = target
        .entries(category.tag())?
        .into_iter()
        .map(|mut entry| {
            for field in strip {
                entry.remove(*field);
            }
            portable_entry(&ctx, entry)
        })
        .collect();
    let count = entries.len();
    tracing::debug!("extracted {count} {category} entries");
    template.set_section(category.tag(), entries);
    Ok(count)
}

/// Drop the target-assigned id from `entry` and tokenize all its strings.
#[must_use]
pub fn portable_entry(ctx: &TokenContext, mut entry: Entry) -> Entry {
    entry.remove(ID_FIELD);
    tokenize_entry(ctx, entry)
}

fn tokenize_entry(ctx: &TokenContext, entry: Entry) -> Entry {
    entry
        .into_iter()
        .map(|(k, v)| (k, tokenize_value(ctx, v)))
        .collect()
}

fn tokenize_value(ctx: &TokenContext, value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(ctx.tokenize(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| tokenize_value(ctx, v))
                .collect(),
        ),
        Value::Object(map) => Value::Object(tokenize_entry(ctx, map)),
        other => other,
    }
}
