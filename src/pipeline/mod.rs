//! The orchestrator: sequences handlers, threads the token context through
//! them, reports progress and lifecycle events, and propagates faults.
//!
//! One run walks the handler sequence in its fixed order.  Every handler
//! ends the run in exactly one terminal state: not applicable (category
//! disabled or applicability check said no), applied/extracted, or faulted.
//! A fault aborts the run; no later handler starts.
mod cancel;
mod notify;

pub use cancel::CancellationFlag;
pub use notify::{
    EventKind, HttpWebhook, LifecycleEvent, MessageFn, Notifier, Operation, ProgressFn, Severity,
    Webhook,
};

#[cfg(test)]
pub(crate) use notify::test_helpers;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::handlers::{HANDLERS, Handler, graph};
use crate::logging::{HandlerStatus, Log};
use crate::target::Target;
use crate::template::{Template, delta};
use crate::tokens::TokenContext;

/// Applicability answers for one run, keyed by position in the sequence.
///
/// Each check runs at most once per run: the answer is stored before it is
/// used, and asking again returns the stored answer.
#[derive(Debug, Default)]
struct Applicability(HashMap<usize, bool>);

impl Applicability {
    fn get_or_eval(&mut self, index: usize, eval: impl FnOnce() -> Result<bool>) -> Result<bool> {
        if let Some(&answer) = self.0.get(&index) {
            return Ok(answer);
        }
        let answer = eval()?;
        self.0.insert(index, answer);
        Ok(answer)
    }
}

/// A handler sequence bound to a logger.
pub struct Pipeline<'a> {
    handlers: Vec<&'a dyn Handler>,
    log: Arc<dyn Log>,
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl Pipeline<'static> {
    /// The built-in handler table in its fixed order.
    #[must_use]
    pub fn standard(log: Arc<dyn Log>) -> Self {
        Self {
            handlers: HANDLERS.to_vec(),
            log,
        }
    }
}

impl<'a> Pipeline<'a> {
    /// A custom handler sequence.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the declared dependencies form a cycle
    /// or a handler is sequenced before one it depends on.
    pub fn with_handlers(
        handlers: Vec<&'a dyn Handler>,
        log: Arc<dyn Log>,
    ) -> Result<Self, PipelineError> {
        if graph::has_cycle(&handlers) {
            return Err(PipelineError::DependencyCycle);
        }
        if let Some((handler, dependency)) = graph::order_violations(&handlers).first() {
            return Err(PipelineError::OutOfOrder {
                handler: (*handler).to_string(),
                dependency: (*dependency).to_string(),
            });
        }
        Ok(Self { handlers, log })
    }

    /// The handler sequence.
    #[must_use]
    pub fn handlers(&self) -> &[&'a dyn Handler] {
        &self.handlers
    }

    /// Apply `template` to `target`.
    ///
    /// Template parameters are registered as `{parameter:NAME}` tokens,
    /// overridden by the run configuration's parameters.  The context is
    /// handed back so the caller can inspect the tokens the handlers
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns the first handler or applicability-check error exactly as
    /// the handler produced it, or [`PipelineError::Cancelled`].
    pub fn apply(
        &self,
        target: &dyn Target,
        template: &mut Template,
        mut ctx: TokenContext,
        config: &RunConfig,
    ) -> Result<TokenContext> {
        for (name, value) in &template.parameters {
            ctx.register_parameter(name, value.as_str());
        }
        for (name, value) in &config.parameters {
            ctx.register_parameter(name, value.as_str());
        }
        tracing::debug!(tokens = ctx.len(), "token context ready");

        self.run(
            Operation::Apply,
            config,
            template,
            |handler, template| handler.will_apply(target, template, config),
            |handler, template| handler.apply(target, template, &mut ctx, config),
        )?;
        Ok(ctx)
    }

    /// Extract a template from `target`, starting from `template`.
    ///
    /// # Errors
    ///
    /// Returns the first handler or applicability-check error exactly as
    /// the handler produced it, or [`PipelineError::Cancelled`].
    pub fn extract(
        &self,
        target: &dyn Target,
        mut template: Template,
        config: &RunConfig,
    ) -> Result<Template> {
        self.run(
            Operation::Extract,
            config,
            &mut template,
            |handler, template| handler.will_extract(target, template, config),
            |handler, template| handler.extract(target, template, config),
        )?;
        Ok(template)
    }

    /// Extract a template and drop every entry whose identity key already
    /// appears in the same category of `base`.
    ///
    /// # Errors
    ///
    /// See [`extract`](Self::extract).
    pub fn extract_delta(
        &self,
        target: &dyn Target,
        template: Template,
        config: &RunConfig,
        base: &Template,
    ) -> Result<Template> {
        let mut extracted = self.extract(target, template, config)?;
        let removed = delta::remove_unchanged(&mut extracted, base);
        self.log
            .info(&format!("removed {removed} entries already present in the base template"));
        Ok(extracted)
    }

    fn run(
        &self,
        operation: Operation,
        config: &RunConfig,
        template: &mut Template,
        mut will_run: impl FnMut(&dyn Handler, &Template) -> Result<bool>,
        mut invoke: impl FnMut(&dyn Handler, &mut Template) -> Result<()>,
    ) -> Result<()> {
        let notifier = &config.notifier;
        notifier.lifecycle(&LifecycleEvent::RunStarted { operation });
        self.log.stage(&format!("{} template", verb(operation)));

        let mut applicability = Applicability::default();
        let mut planned = Vec::new();
        for (index, &handler) in self.handlers.iter().enumerate() {
            if !config.categories.contains(handler.category()) {
                self.log
                    .debug(&format!("skipping {}: category disabled", handler.name()));
                self.log.record_handler(
                    handler.name(),
                    HandlerStatus::NotApplicable,
                    Some("category disabled"),
                );
                continue;
            }
            match applicability.get_or_eval(index, || will_run(handler, &*template)) {
                Ok(true) => planned.push(handler),
                Ok(false) => {
                    self.log
                        .debug(&format!("skipping {}: nothing to do", handler.name()));
                    self.log
                        .record_handler(handler.name(), HandlerStatus::NotApplicable, None);
                }
                Err(e) => return Err(self.fault(handler, config, e)),
            }
        }

        let total = planned.iter().filter(|h| h.reports_progress()).count();
        let mut step = 0;
        for handler in planned {
            if config.cancel.is_cancelled() {
                let err = PipelineError::Cancelled {
                    before: handler.internal_name().to_string(),
                }
                .into();
                return Err(self.fault(handler, config, err));
            }

            notifier.lifecycle(&LifecycleEvent::HandlerStarted {
                handler: handler.internal_name(),
            });
            if handler.reports_progress() {
                step += 1;
                notifier.progress(handler.name(), step, total);
            }
            self.log.stage(handler.name());

            if let Err(e) = invoke(handler, template) {
                return Err(self.fault(handler, config, e));
            }

            let status = match operation {
                Operation::Apply => HandlerStatus::Applied,
                Operation::Extract => HandlerStatus::Extracted,
            };
            self.log.record_handler(handler.name(), status, None);
            notifier.lifecycle(&LifecycleEvent::HandlerCompleted {
                handler: handler.internal_name(),
            });
        }

        notifier.lifecycle(&LifecycleEvent::RunCompleted { operation });
        Ok(())
    }

    /// Record and announce a fault, handing the error back untouched.
    fn fault(&self, handler: &dyn Handler, config: &RunConfig, err: anyhow::Error) -> anyhow::Error {
        self.log.error(&format!("{}: {err:#}", handler.name()));
        self.log.record_handler(
            handler.name(),
            HandlerStatus::Faulted,
            Some(&format!("{err:#}")),
        );
        config.notifier.lifecycle(&LifecycleEvent::ExceptionOccurred {
            handler: handler.internal_name(),
            error: &err,
        });
        err
    }
}

const fn verb(operation: Operation) -> &'static str {
    match operation {
        Operation::Apply => "Applying",
        Operation::Extract => "Extracting",
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::test_helpers::RecordingWebhook;
    use super::*;
    use crate::config::{Category, CategorySet};
    use crate::logging::HandlerEntry;
    use crate::target::MemoryTarget;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Log that keeps handler records in memory.
    #[derive(Debug, Default)]
    struct RecordingLog {
        entries: Mutex<Vec<HandlerEntry>>,
    }

    impl RecordingLog {
        fn statuses(&self) -> Vec<(String, HandlerStatus)> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|e| (e.name.clone(), e.status))
                .collect()
        }
    }

    impl Log for RecordingLog {
        fn stage(&self, _: &str) {}
        fn info(&self, _: &str) {}
        fn debug(&self, _: &str) {}
        fn warn(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn record_handler(&self, name: &str, status: HandlerStatus, message: Option<&str>) {
            self.entries.lock().unwrap().push(HandlerEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// A handler whose behaviour is fixed at construction and which
    /// records every call into a shared journal.
    struct Scripted {
        name: &'static str,
        category: Category,
        applicable: bool,
        fails: bool,
        check_fails: bool,
        progress: bool,
        checks: AtomicUsize,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(name: &'static str, category: Category, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                category,
                applicable: true,
                fails: false,
                check_fails: false,
                progress: true,
                checks: AtomicUsize::new(0),
                journal: Arc::clone(journal),
            }
        }

        fn note(&self, what: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{what}:{}", self.name));
        }

        fn check(&self) -> Result<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.note("check");
            if self.check_fails {
                anyhow::bail!("{} check exploded", self.name);
            }
            Ok(self.applicable)
        }

        fn run(&self) -> Result<()> {
            self.note("run");
            if self.fails {
                anyhow::bail!("{} exploded", self.name);
            }
            Ok(())
        }
    }

    impl Handler for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn internal_name(&self) -> &str {
            self.name
        }
        fn category(&self) -> Category {
            self.category
        }
        fn reports_progress(&self) -> bool {
            self.progress
        }
        fn will_apply(&self, _: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
            self.check()
        }
        fn will_extract(&self, _: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
            self.check()
        }
        fn apply(
            &self,
            _: &dyn Target,
            _: &mut Template,
            ctx: &mut TokenContext,
            _: &RunConfig,
        ) -> Result<()> {
            ctx.register_parameter(self.name, "seen");
            self.run()
        }
        fn extract(&self, _: &dyn Target, template: &mut Template, _: &RunConfig) -> Result<()> {
            template
                .parameters
                .insert(self.name.to_string(), "extracted".to_string());
            self.run()
        }
    }

    struct Fixture {
        journal: Arc<Mutex<Vec<String>>>,
        handlers: Vec<Scripted>,
        log: Arc<RecordingLog>,
        target: MemoryTarget,
    }

    impl Fixture {
        fn new() -> Self {
            let journal = Arc::new(Mutex::new(Vec::new()));
            let handlers = Category::ALL
                .iter()
                .map(|&c| Scripted::new(c.tag(), c, &journal))
                .collect();
            Self {
                journal,
                handlers,
                log: Arc::new(RecordingLog::default()),
                target: MemoryTarget::new("https://contoso.example/sites/dev", "Dev"),
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            let handlers = self.handlers.iter().map(|h| h as &dyn Handler).collect();
            let log: Arc<dyn Log> = Arc::clone(&self.log) as Arc<dyn Log>;
            Pipeline::with_handlers(handlers, log).unwrap()
        }

        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }

        fn runs(&self) -> Vec<String> {
            self.journal()
                .into_iter()
                .filter_map(|j| j.strip_prefix("run:").map(str::to_string))
                .collect()
        }

        fn apply(&self, config: &RunConfig) -> Result<TokenContext> {
            let ctx = TokenContext::for_target(&self.target);
            self.pipeline()
                .apply(&self.target, &mut Template::default(), ctx, config)
        }
    }

    fn progress_config() -> (RunConfig, Arc<Mutex<Vec<(String, usize, usize)>>>, RecordingWebhook) {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&steps);
        let hook = RecordingWebhook::default();
        let notifier = Notifier::new()
            .on_progress(move |name, step, total| {
                sink.lock().unwrap().push((name.to_string(), step, total));
            })
            .with_webhook(hook.clone());
        (RunConfig::new().with_notifier(notifier), steps, hook)
    }

    #[test]
    fn order_is_preserved_for_every_category_combination() {
        for mask in 0u32..64 {
            let fx = Fixture::new();
            let enabled: CategorySet = Category::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, &c)| c)
                .collect();
            let (config, steps, _) = progress_config();
            let config = config.with_categories(enabled);

            fx.apply(&config).unwrap();

            let expected: Vec<String> = Category::ALL
                .iter()
                .filter(|c| enabled.contains(**c))
                .map(|c| c.tag().to_string())
                .collect();
            assert_eq!(fx.runs(), expected, "mask {mask:#08b}");

            let steps = steps.lock().unwrap();
            let indices: Vec<usize> = steps.iter().map(|(_, step, _)| *step).collect();
            assert_eq!(indices, (1..=expected.len()).collect::<Vec<_>>());
            assert!(steps.iter().all(|(_, _, total)| *total == expected.len()));
        }
    }

    #[test]
    fn disabled_categories_are_never_checked() {
        let fx = Fixture::new();
        let config = RunConfig::new().with_categories(CategorySet::none().with(Category::Lists));
        fx.apply(&config).unwrap();
        assert_eq!(fx.journal(), vec!["check:lists", "run:lists"]);
    }

    #[test]
    fn progress_counts_only_applicable_reporting_handlers() {
        let mut fx = Fixture::new();
        fx.handlers[1].applicable = false;
        fx.handlers[3].progress = false;
        let (config, steps, _) = progress_config();

        fx.apply(&config).unwrap();

        let steps = steps.lock().unwrap();
        let seen: Vec<(&str, usize, usize)> = steps
            .iter()
            .map(|(n, s, t)| (n.as_str(), *s, *t))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("subsites", 1, 4),
                ("lists", 2, 4),
                ("navigation", 3, 4),
                ("property-bag", 4, 4),
            ]
        );
        assert_eq!(fx.runs().len(), 5);
    }

    #[test]
    fn applicability_is_evaluated_once_and_before_any_handler_runs() {
        let fx = Fixture::new();
        fx.apply(&RunConfig::new()).unwrap();
        for handler in &fx.handlers {
            assert_eq!(handler.checks.load(Ordering::SeqCst), 1, "{}", handler.name);
        }
        let journal = fx.journal();
        let first_run = journal.iter().position(|j| j.starts_with("run:")).unwrap();
        assert!(journal[..first_run].iter().all(|j| j.starts_with("check:")));
        assert_eq!(first_run, fx.handlers.len());
    }

    #[test]
    fn applicability_memo_returns_stored_answer() {
        let fx = Fixture::new();
        let handler = &fx.handlers[0];
        let mut memo = Applicability::default();
        assert!(memo.get_or_eval(0, || handler.check()).unwrap());
        assert!(memo.get_or_eval(0, || handler.check()).unwrap());
        assert_eq!(handler.checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fault_aborts_run_with_one_exception_event() {
        let mut fx = Fixture::new();
        fx.handlers[2].fails = true;
        let (config, _, hook) = progress_config();

        let err = fx.apply(&config).unwrap_err();

        assert_eq!(err.to_string(), "lists exploded");
        assert_eq!(fx.runs(), vec!["subsites", "fields", "lists"]);
        let events = hook.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.starts_with("exception-occurred"))
                .collect::<Vec<_>>(),
            vec!["exception-occurred:lists"]
        );
        assert!(!events.iter().any(|e| e == "run-completed"));
        assert!(!events.iter().any(|e| e == "handler-completed:lists"));
        assert_eq!(
            fx.log.statuses().last().unwrap(),
            &("lists".to_string(), HandlerStatus::Faulted)
        );
    }

    #[test]
    fn handler_error_is_returned_unwrapped() {
        let mut fx = Fixture::new();
        fx.handlers[0].fails = true;
        let err = fx.apply(&RunConfig::new()).unwrap_err();
        assert_eq!(err.chain().count(), 1);
        assert!(err.downcast_ref::<PipelineError>().is_none());
    }

    #[test]
    fn applicability_fault_propagates_like_handler_fault() {
        let mut fx = Fixture::new();
        fx.handlers[1].check_fails = true;
        let (config, _, hook) = progress_config();

        let err = fx.apply(&config).unwrap_err();

        assert_eq!(err.to_string(), "fields check exploded");
        assert!(fx.runs().is_empty());
        assert_eq!(
            hook.events(),
            vec!["run-started", "exception-occurred:fields"]
        );
    }

    #[test]
    fn lifecycle_events_bracket_every_handler() {
        let fx = Fixture::new();
        let config = RunConfig::new()
            .with_categories(CategorySet::none().with(Category::Fields).with(Category::Lists));
        let hook = RecordingWebhook::default();
        let config = config.with_notifier(Notifier::new().with_webhook(hook.clone()));

        fx.apply(&config).unwrap();

        assert_eq!(
            hook.events(),
            vec![
                "run-started",
                "handler-started:fields",
                "handler-completed:fields",
                "handler-started:lists",
                "handler-completed:lists",
                "run-completed",
            ]
        );
    }

    #[test]
    fn cancellation_stops_before_next_handler() {
        let fx = Fixture::new();
        let (config, _, hook) = progress_config();
        config.cancel.cancel();

        let err = fx.apply(&config).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Cancelled { before }) if before == "subsites"
        ));
        assert!(fx.runs().is_empty());
        assert!(hook.events().contains(&"exception-occurred:subsites".to_string()));
    }

    #[test]
    fn context_flows_through_and_back() {
        let fx = Fixture::new();
        let ctx = fx.apply(&RunConfig::new()).unwrap();
        assert_eq!(ctx.parse_string("{parameter:fields}"), "seen");
        assert_eq!(ctx.parse_string("{$navigation}"), "seen");
    }

    #[test]
    fn parameters_from_config_override_template() {
        let fx = Fixture::new();
        let mut template = Template::default();
        template
            .parameters
            .insert("Owner".to_string(), "template".to_string());
        template
            .parameters
            .insert("Region".to_string(), "west".to_string());
        let mut config = RunConfig::new().with_categories(CategorySet::none());
        config
            .parameters
            .insert("Owner".to_string(), "override".to_string());

        let ctx = fx
            .pipeline()
            .apply(
                &fx.target,
                &mut template,
                TokenContext::for_target(&fx.target),
                &config,
            )
            .unwrap();
        assert_eq!(ctx.parse_string("{parameter:Owner}/{$Region}"), "override/west");
    }

    #[test]
    fn extract_threads_the_template() {
        let fx = Fixture::new();
        let config = RunConfig::new()
            .with_categories(CategorySet::none().with(Category::Navigation));
        let out = fx
            .pipeline()
            .extract(&fx.target, Template::default(), &config)
            .unwrap();
        assert_eq!(out.parameters.get("navigation").unwrap(), "extracted");
        assert_eq!(
            fx.log.statuses(),
            vec![
                ("subsites".to_string(), HandlerStatus::NotApplicable),
                ("fields".to_string(), HandlerStatus::NotApplicable),
                ("lists".to_string(), HandlerStatus::NotApplicable),
                ("list-items".to_string(), HandlerStatus::NotApplicable),
                ("property-bag".to_string(), HandlerStatus::NotApplicable),
                ("navigation".to_string(), HandlerStatus::Extracted),
            ]
        );
    }

    #[test]
    fn standard_pipeline_uses_handler_table_order() {
        let log: Arc<dyn Log> = Arc::new(RecordingLog::default());
        let pipeline = Pipeline::standard(log);
        let names: Vec<&str> = pipeline.handlers().iter().map(|h| h.internal_name()).collect();
        assert_eq!(
            names,
            vec!["subsites", "fields", "lists", "list-items", "navigation", "property-bag"]
        );
    }

    #[test]
    fn out_of_order_sequence_is_rejected() {
        use crate::handlers::{fields::ProvisionFields, lists::ProvisionLists};
        let log: Arc<dyn Log> = Arc::new(RecordingLog::default());
        let err = Pipeline::with_handlers(vec![&ProvisionLists, &ProvisionFields], log).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfOrder { ref handler, ref dependency }
                if handler == "lists" && dependency == "fields"
        ));
    }
}
