//! Fault isolation around one decoder invocation.

use log::{debug, warn};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::pipeline::{Mediator, QueueError};

/// How a single decoder invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed,
    /// The decoder returned an error or panicked. Reported as an invocation-level parse error.
    Faulted,
    /// An output channel was closed under the decoder (run aborted).
    Interrupted,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn is_closed_channel(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<QueueError>(), Some(QueueError::Closed)))
}

/// Run `f` for the decoder bound to `mediator`. Errors and panics never escape: they become an
/// [`ErrorKind::Invocation`](crate::ErrorKind::Invocation) report on the mediator's error channel.
pub fn run_isolated<F>(mediator: &Mediator, f: F) -> InvocationOutcome
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let message = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return InvocationOutcome::Completed,
        Ok(Err(e)) if is_closed_channel(&e) => {
            debug!(
                "{} on {} interrupted: {}",
                mediator.decoder_name(),
                mediator.path_spec(),
                e
            );
            return InvocationOutcome::Interrupted;
        }
        Ok(Err(e)) => format!("decoder fault: {e:#}"),
        Err(payload) => format!("decoder panicked: {}", panic_message(payload.as_ref())),
    };
    warn!(
        "{} on {}: {}",
        mediator.decoder_name(),
        mediator.path_spec(),
        message
    );
    match mediator.report_fault(message) {
        Ok(()) => InvocationOutcome::Faulted,
        Err(_) => InvocationOutcome::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::pipeline::Channel;
    use crate::{ErrorKind, Event, EventData, ParseError, PathSpec, TimestampKind};
    use std::sync::Arc;

    fn setup() -> (Mediator, Channel<Event>, Channel<ParseError>) {
        let events = Channel::in_memory(None);
        let errors = Channel::in_memory(None);
        let m = Mediator::new(
            "sniffer",
            PathSpec::os("/evidence/f"),
            events.producer(),
            errors.producer(),
            Arc::new(KnowledgeBase::new()),
        );
        (m, events, errors)
    }

    fn drain_errors(errors: &Channel<ParseError>) -> Vec<ParseError> {
        errors.signal_end_of_stream();
        let mut out = Vec::new();
        errors.consumer().drain(|e| out.push(e));
        out
    }

    #[test]
    fn test_error_becomes_invocation_fault() {
        let (m, _events, errors) = setup();
        let outcome = run_isolated(&m, || anyhow::bail!("truncated header"));
        assert_eq!(outcome, InvocationOutcome::Faulted);
        let errs = drain_errors(&errors);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::Invocation);
        assert_eq!(errs[0].decoder, "sniffer");
        assert!(errs[0].message.contains("truncated header"));
    }

    #[test]
    fn test_panic_is_contained() {
        let (m, _events, errors) = setup();
        let outcome = run_isolated(&m, || panic!("index out of range"));
        assert_eq!(outcome, InvocationOutcome::Faulted);
        let errs = drain_errors(&errors);
        assert!(errs[0].message.contains("decoder panicked: index out of range"));
    }

    #[test]
    fn test_closed_channel_is_interruption_not_fault() {
        let (m, events, errors) = setup();
        events.signal_abort();
        let outcome = run_isolated(&m, || {
            m.emit_event(EventData::new("t", 1, TimestampKind::Other))?;
            Ok(())
        });
        assert_eq!(outcome, InvocationOutcome::Interrupted);
        assert!(drain_errors(&errors).is_empty());
    }
}
