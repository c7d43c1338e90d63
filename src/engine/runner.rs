//! Sequential and parallel runners. Both take the scheduled invocations and feed the sink
//! through the run's event/error channels.

use anyhow::Context;
use crossbeam_channel::unbounded;
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use super::invoke::{InvocationOutcome, run_isolated};
use super::progress::{ProgressBar, flush_progress_remainder, report_progress_batched};
use super::schedule::Invocation;
use super::state::RunControl;
use crate::decoders::Decoder;
use crate::knowledge::KnowledgeBase;
use crate::output::EventSink;
use crate::pipeline::{DrainStatus, Mediator, RunChannels};
use crate::utils::config::ProgressConsts;
use crate::vfs::FileSystem;
use crate::{Event, ParseError, RunState};

/// What every runner needs besides the invocations.
pub(crate) struct RunContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub knowledge: Arc<KnowledgeBase>,
    pub channels: &'a RunChannels,
    pub control: &'a RunControl<'a>,
    pub progress: Option<ProgressBar>,
}

impl RunContext<'_> {
    /// Run one invocation under fault isolation and record its outcome.
    fn execute(&self, invocation: &Invocation) -> InvocationOutcome {
        let spec = invocation.path_spec();
        let mediator = Mediator::new(
            invocation.decoder.name(),
            spec.clone(),
            self.channels.events.producer(),
            self.channels.errors.producer(),
            Arc::clone(&self.knowledge),
        );
        let outcome = match &invocation.decoder {
            Decoder::FileEntry(d) => run_isolated(&mediator, || d.decode(&mediator, &invocation.entry)),
            Decoder::Stream(d) => run_isolated(&mediator, || {
                let mut reader = self
                    .fs
                    .open_stream(spec)
                    .with_context(|| format!("open {spec}"))?;
                d.decode(&mediator, &mut reader)
            }),
        };
        self.control.invocations.fetch_add(1, Ordering::SeqCst);
        let faults = usize::from(outcome == InvocationOutcome::Faulted) + mediator.nested_faults();
        if faults > 0 {
            self.control.faults.fetch_add(faults, Ordering::SeqCst);
        }
        outcome
    }

    fn deliver_event(&self, sink: &mut dyn EventSink, event: Event) -> anyhow::Result<()> {
        sink.write_event(event)?;
        self.control.events.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deliver_error(&self, sink: &mut dyn EventSink, error: ParseError) -> anyhow::Result<()> {
        sink.write_error(error)?;
        self.control.errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sink_failed(&self, e: anyhow::Error) {
        self.control.abort(format!("output sink failed: {e:#}"));
    }
}

/// One invocation at a time; after each, whatever it produced is drained on this thread.
pub(crate) fn run_sequential(
    ctx: &RunContext<'_>,
    invocations: &[Invocation],
    sink: &mut dyn EventSink,
) {
    let events = ctx.channels.events.consumer();
    let errors = ctx.channels.errors.consumer();
    let done = AtomicUsize::new(0);

    for invocation in invocations {
        if ctx.control.should_stop() {
            break;
        }
        if ctx.execute(invocation) == InvocationOutcome::Interrupted {
            break;
        }
        report_progress_batched(
            ctx.progress.as_ref(),
            &done,
            ProgressConsts::UPDATE_BATCH_SIZE,
        );
        let drained = events
            .drain_available(|e| ctx.deliver_event(sink, e))
            .and_then(|_| errors.drain_available(|e| ctx.deliver_error(sink, e)));
        if let Err(e) = drained {
            ctx.sink_failed(e);
            break;
        }
    }
    flush_progress_remainder(
        ctx.progress.as_ref(),
        done.load(Ordering::Relaxed),
    );

    ctx.control.tracker.advance(RunState::Draining);
    ctx.channels.close();
    let drained = events
        .try_drain(|e| ctx.deliver_event(sink, e))
        .and_then(|_| errors.try_drain(|e| ctx.deliver_error(sink, e)));
    if let Err(e) = drained {
        ctx.sink_failed(e);
    }
}

/// Worker threads pull invocations from a shared queue. This thread collects events while a
/// helper collects errors; a closer joins the workers and then closes the channels.
pub(crate) fn run_parallel(
    ctx: &RunContext<'_>,
    invocations: Vec<Invocation>,
    num_workers: usize,
    sink: &mut dyn EventSink,
) {
    let (work_tx, work_rx) = unbounded::<Invocation>();
    for invocation in invocations {
        // Receiver is alive until the scope below ends.
        let _ = work_tx.send(invocation);
    }
    drop(work_tx);

    let done = AtomicUsize::new(0);
    let sink = Mutex::new(sink);
    let events = ctx.channels.events.consumer();
    let errors = ctx.channels.errors.consumer();

    thread::scope(|s| {
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let work_rx = work_rx.clone();
            let done = &done;
            let spawned = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn_scoped(s, move || {
                    while let Ok(invocation) = work_rx.recv() {
                        if ctx.control.should_stop() {
                            break;
                        }
                        if ctx.execute(&invocation) == InvocationOutcome::Interrupted {
                            break;
                        }
                        report_progress_batched(
                            ctx.progress.as_ref(),
                            done,
                            ProgressConsts::UPDATE_BATCH_SIZE,
                        );
                    }
                    debug!("worker {} done", worker_id);
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Workers already started still finish; channels get closed by the closer.
                    ctx.control.abort(format!("cannot spawn worker thread: {e}"));
                    break;
                }
            }
        }
        drop(work_rx);

        s.spawn(|| {
            for handle in workers {
                if handle.join().is_err() {
                    ctx.control.abort("worker thread panicked");
                }
            }
            ctx.control.tracker.advance(RunState::Draining);
            ctx.channels.close();
        });

        let spawned = thread::Builder::new()
            .name("error-collector".to_string())
            .spawn_scoped(s, || {
                errors.try_drain(|e| {
                    let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    ctx.deliver_error(&mut **sink, e)
                })
            });
        let error_collector = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // Abort releases the workers; the scope then joins them.
                ctx.control.abort(format!("cannot spawn error collector: {e}"));
                return;
            }
        };

        let status = events.try_drain(|e| {
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            ctx.deliver_event(&mut **sink, e)
        });
        match status {
            Ok(DrainStatus::Complete) => {}
            Ok(DrainStatus::Aborted) => debug!("event collector stopped on abort"),
            Err(e) => ctx.sink_failed(e),
        }

        match error_collector.join() {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => ctx.sink_failed(e),
            Err(_) => {
                warn!("error collector panicked");
                ctx.control.abort("error collector panicked");
            }
        }
    });

    flush_progress_remainder(
        ctx.progress.as_ref(),
        done.load(Ordering::Relaxed),
    );
}
