//! Engine: resolve inputs, seed and freeze knowledge, schedule invocations, run them and
//! route the output to a sink.

use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::cancel::CancelHandle;
use super::progress::create_progress_bar;
use super::runner::{RunContext, run_parallel, run_sequential};
use super::schedule::schedule;
use super::state::{RunControl, RunTracker};
use crate::decoders::DecoderRegistry;
use crate::knowledge::{KnowledgeBase, Preprocessor};
use crate::output::{CollectingSink, EventSink};
use crate::pipeline::{PipelineTuning, QueueError, RunChannels};
use crate::utils::config::PackagePaths;
use crate::vfs::{FileSystem, OsFileSystem, ResolveError};
use crate::{Event, Opts, ParseError, PathSpec, RunState, RunSummary};

/// Conditions that stop a run before it starts, or that the sink raises after it ends.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown decoder(s): {}", .0.join(", "))]
    UnknownDecoder(Vec<String>),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("cannot create run channels: {0}")]
    Queue(#[from] QueueError),
    #[error("output sink failed to finish: {0:#}")]
    Sink(anyhow::Error),
}

/// Everything a batch run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
    pub summary: RunSummary,
}

pub struct Engine {
    opts: Opts,
    registry: DecoderRegistry,
    fs: Arc<dyn FileSystem>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    cancel: CancelHandle,
}

impl Engine {
    /// Built-in decoders on the host filesystem.
    pub fn new(opts: Opts) -> Self {
        let mut exclude = opts.exclude.clone();
        exclude.extend(PackagePaths::get().default_exclude_patterns());
        let fs = Arc::new(OsFileSystem::new(exclude, opts.follow_links));
        Self {
            opts,
            registry: DecoderRegistry::with_builtins(),
            fs,
            preprocessors: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_registry(mut self, registry: DecoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Add a step that seeds the knowledge store before any decoder runs.
    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Handle that aborts the active run from any thread. Stays cancelled until reset.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn resolve(&self, locators: &[String]) -> Result<Vec<PathSpec>, EngineError> {
        let mut specs = Vec::new();
        for locator in locators {
            specs.extend(self.fs.resolve(locator)?);
        }
        Ok(specs)
    }

    fn preprocess(&self, knowledge: &mut KnowledgeBase) {
        for p in &self.preprocessors {
            if let Err(e) = p.run(knowledge) {
                warn!("Preprocessor {} failed: {:#}", p.name(), e);
            }
        }
    }

    /// Run every applicable decoder over `locators` and deliver the output to `sink`.
    ///
    /// `knowledge` is moved in: it is frozen before the first decoder starts. An aborted run
    /// still returns `Ok`, with the partial counts and [`RunSummary::aborted`] set.
    pub fn run<L: AsRef<str>>(
        &self,
        locators: &[L],
        mut knowledge: KnowledgeBase,
        sink: &mut dyn EventSink,
    ) -> Result<RunSummary, EngineError> {
        let unknown = self.registry.unknown_names(&self.opts.decoders);
        if !unknown.is_empty() {
            return Err(EngineError::UnknownDecoder(
                unknown.into_iter().map(String::from).collect(),
            ));
        }

        let tracker = RunTracker::new();
        tracker.advance(RunState::Resolving);
        let locators: Vec<String> = locators.iter().map(|l| l.as_ref().to_string()).collect();
        let specs = self.resolve(&locators)?;
        self.preprocess(&mut knowledge);
        let knowledge = Arc::new(knowledge);

        let tuning = PipelineTuning::from_opts(&self.opts);
        debug!("{:?}", tuning);
        let channels = RunChannels::create(&tuning)?;
        let _attached = self.cancel.attach(Arc::new(channels.clone()));

        tracker.advance(RunState::Scheduling);
        let mut control = RunControl::new(tracker, &channels, &self.cancel);
        control.inputs = specs.len();
        let plan = schedule(
            self.fs.as_ref(),
            &self.registry,
            &specs,
            &self.opts.decoders,
            self.opts.strict,
        );
        for error in plan.input_errors {
            if let Err(e) = sink.write_error(error) {
                control.abort(format!("output sink failed: {e:#}"));
                break;
            }
            control.errors.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(reason) = plan.fatal {
            control.abort(reason);
        }

        if !control.should_stop() {
            control.tracker.advance(RunState::Running);
            let progress = self
                .opts
                .verbose
                .then(|| create_progress_bar(plan.invocations.len(), "Decoding"));
            let ctx = RunContext {
                fs: self.fs.as_ref(),
                knowledge,
                channels: &channels,
                control: &control,
                progress,
            };
            if tuning.sequential {
                run_sequential(&ctx, &plan.invocations, sink);
            } else {
                run_parallel(&ctx, plan.invocations, tuning.num_workers, sink);
            }
        }

        let summary = control.finish();
        if summary.aborted() {
            warn!(
                "Run aborted ({}): {} events delivered",
                summary.abort_reason.as_deref().unwrap_or("unknown"),
                summary.events
            );
        } else {
            info!(
                "Run done: {} events, {} errors from {} invocations",
                summary.events, summary.errors, summary.invocations
            );
        }
        sink.finish(&summary).map_err(EngineError::Sink)?;
        Ok(summary)
    }

    /// [`run`](Self::run) into memory.
    pub fn run_collect<L: AsRef<str>>(
        &self,
        locators: &[L],
        knowledge: KnowledgeBase,
    ) -> Result<RunOutcome, EngineError> {
        let mut sink = CollectingSink::new();
        let summary = self.run(locators, knowledge, &mut sink)?;
        Ok(RunOutcome {
            events: sink.events,
            errors: sink.errors,
            summary,
        })
    }
}
