//! Per-run state machine and abort bookkeeping.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::cancel::CancelHandle;
use crate::pipeline::RunChannels;
use crate::{RunState, RunSummary};

/// Tracks the run's state. Only legal transitions are applied.
#[derive(Debug)]
pub struct RunTracker {
    state: Mutex<RunState>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`. Returns false (and leaves the state alone) for an illegal transition.
    pub fn advance(&self, next: RunState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_advance_to(next) {
            debug!("Ignoring transition {:?} -> {:?}", *state, next);
            return false;
        }
        debug!("Run state {:?} -> {:?}", *state, next);
        *state = next;
        true
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared by the runner threads of one run: counters, abort reason, and the channels to abort.
pub(crate) struct RunControl<'a> {
    pub tracker: RunTracker,
    channels: &'a RunChannels,
    cancel: &'a CancelHandle,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    pub inputs: usize,
    pub invocations: AtomicUsize,
    pub faults: AtomicUsize,
    pub events: AtomicUsize,
    pub errors: AtomicUsize,
}

impl<'a> RunControl<'a> {
    pub fn new(tracker: RunTracker, channels: &'a RunChannels, cancel: &'a CancelHandle) -> Self {
        Self {
            tracker,
            channels,
            cancel,
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            inputs: 0,
            invocations: AtomicUsize::new(0),
            faults: AtomicUsize::new(0),
            events: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// Engine-level abort. The first reason wins; channels are aborted every time (idempotent).
    pub fn abort(&self, reason: impl Into<String>) {
        {
            let mut slot = self
                .abort_reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                let reason = reason.into();
                warn!("Aborting run: {}", reason);
                *slot = Some(reason);
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
        self.channels.abort();
    }

    /// True once the run was aborted or cancelled. Checked between invocations.
    pub fn should_stop(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn reason(&self) -> Option<String> {
        let slot = self
            .abort_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match (&*slot, self.cancel.is_cancelled()) {
            (Some(r), _) => Some(r.clone()),
            (None, true) => Some("cancelled".to_string()),
            (None, false) => None,
        }
    }

    /// Move to the terminal state and build the summary.
    pub fn finish(&self) -> RunSummary {
        let abort_reason = self.reason();
        if abort_reason.is_some() {
            self.tracker.advance(RunState::Aborted);
        } else {
            self.tracker.advance(RunState::Done);
        }
        RunSummary {
            state: self.tracker.state(),
            inputs: self.inputs,
            invocations: self.invocations.load(Ordering::SeqCst),
            events: self.events.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            faults: self.faults.load(Ordering::SeqCst),
            abort_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineTuning;
    use crate::{ExecutionMode, Opts};

    #[test]
    fn test_tracker_rejects_illegal_transitions() {
        let tracker = RunTracker::new();
        assert!(!tracker.advance(RunState::Running));
        assert!(tracker.advance(RunState::Resolving));
        assert!(tracker.advance(RunState::Scheduling));
        assert!(tracker.advance(RunState::Aborted));
        assert!(!tracker.advance(RunState::Done));
        assert_eq!(tracker.state(), RunState::Aborted);
    }

    #[test]
    fn test_abort_keeps_first_reason_and_finishes_aborted() {
        let opts = Opts {
            mode: ExecutionMode::Sequential,
            ..Default::default()
        };
        let channels = RunChannels::create(&PipelineTuning::from_opts(&opts)).unwrap();
        let cancel = CancelHandle::new();
        let tracker = RunTracker::new();
        tracker.advance(RunState::Resolving);
        tracker.advance(RunState::Scheduling);
        let control = RunControl::new(tracker, &channels, &cancel);
        control.abort("strict mode: unreadable input");
        control.abort("later");
        assert!(control.should_stop());
        let summary = control.finish();
        assert!(summary.aborted());
        assert_eq!(
            summary.abort_reason.as_deref(),
            Some("strict mode: unreadable input")
        );
    }
}
