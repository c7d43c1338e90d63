//! Run context and tuning: the event/error channels of one run and the settings derived
//! from options and machine limits.

use log::debug;

use super::queue::{Abortable, Channel, QueueError};
use crate::utils::config::{QueueConsts, WorkerThreadLimits};
use crate::utils::fd_limit::max_workers_by_fd_limit;
use crate::{Event, ExecutionMode, Opts, ParseError, QueueKind};

/// Settings the runners work with, derived once per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineTuning {
    /// 1 in sequential mode.
    pub num_workers: usize,
    pub sequential: bool,
    pub queue_kind: QueueKind,
    /// Event/error channel bound. `None` (unbounded) in sequential mode.
    pub channel_cap: Option<usize>,
}

impl PipelineTuning {
    pub fn from_opts(opts: &Opts) -> Self {
        match opts.mode {
            ExecutionMode::Sequential => Self {
                num_workers: 1,
                sequential: true,
                queue_kind: opts.queue_kind,
                channel_cap: None,
            },
            ExecutionMode::Parallel { workers } => {
                let limits = WorkerThreadLimits::current();
                let wanted = workers
                    .unwrap_or_else(|| limits.all_threads.clamp(limits.floor, limits.max))
                    .max(1);
                let num_workers = match max_workers_by_fd_limit() {
                    Some(fd_cap) if fd_cap < wanted => {
                        debug!("Capping workers {} -> {} (FD limit ~80%)", wanted, fd_cap);
                        fd_cap.max(1)
                    }
                    _ => wanted,
                };
                Self {
                    num_workers,
                    sequential: false,
                    queue_kind: opts.queue_kind,
                    channel_cap: Some(opts.queue_capacity.unwrap_or(QueueConsts::DEFAULT_CAPACITY)),
                }
            }
        }
    }
}

/// The two output channels every invocation of a run writes to.
#[derive(Clone)]
pub struct RunChannels {
    pub events: Channel<Event>,
    pub errors: Channel<ParseError>,
}

impl RunChannels {
    pub fn create(tuning: &PipelineTuning) -> Result<Self, QueueError> {
        Ok(Self {
            events: Channel::new(tuning.queue_kind, tuning.channel_cap)?,
            errors: Channel::new(tuning.queue_kind, tuning.channel_cap)?,
        })
    }

    /// Graceful close of both channels.
    pub fn close(&self) {
        self.events.signal_end_of_stream();
        self.errors.signal_end_of_stream();
    }

    pub fn abort(&self) {
        self.events.signal_abort();
        self.errors.signal_abort();
    }
}

impl Abortable for RunChannels {
    fn abort(&self) {
        RunChannels::abort(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_tuning_is_unbounded_single_worker() {
        let opts = Opts {
            mode: ExecutionMode::Sequential,
            queue_capacity: Some(3),
            ..Default::default()
        };
        let t = PipelineTuning::from_opts(&opts);
        assert_eq!(t.num_workers, 1);
        assert!(t.sequential);
        assert_eq!(t.channel_cap, None);
    }

    #[test]
    fn test_parallel_tuning_respects_requested_workers_and_cap() {
        let opts = Opts {
            mode: ExecutionMode::Parallel { workers: Some(3) },
            queue_capacity: Some(16),
            ..Default::default()
        };
        let t = PipelineTuning::from_opts(&opts);
        assert!(!t.sequential);
        assert!(t.num_workers >= 1 && t.num_workers <= 3);
        assert_eq!(t.channel_cap, Some(16));
    }
}
