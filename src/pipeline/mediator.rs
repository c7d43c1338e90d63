//! Per-invocation mediator: binds one decoder run to its output channels, its path spec,
//! its provenance chain and the frozen knowledge store.

use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::producer::Producer;
use super::queue::QueueError;
use crate::decoders::StreamDecoder;
use crate::engine::invoke::{InvocationOutcome, run_isolated};
use crate::knowledge::{KnowledgeBase, KnowledgeKey};
use crate::{ErrorKind, Event, EventData, ParseError, PathSpec};

/// Lives for exactly one decoder invocation. Nested invocations get a derived mediator.
pub struct Mediator {
    path_spec: PathSpec,
    parser_chain: Vec<String>,
    events: Producer<Event>,
    errors: Producer<ParseError>,
    knowledge: Arc<KnowledgeBase>,
    /// Faulted nested invocations, shared by every mediator derived from the same root.
    nested_faults: Arc<AtomicUsize>,
}

impl Mediator {
    pub fn new(
        decoder_name: &str,
        path_spec: PathSpec,
        events: Producer<Event>,
        errors: Producer<ParseError>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            path_spec,
            parser_chain: vec![decoder_name.to_string()],
            events,
            errors,
            knowledge,
            nested_faults: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    /// Name of the decoder this mediator was built for (last entry of the chain).
    pub fn decoder_name(&self) -> &str {
        self.parser_chain.last().map(String::as_str).unwrap_or_default()
    }

    /// Nested invocations under this mediator tree that ended in a fault.
    pub fn nested_faults(&self) -> usize {
        self.nested_faults.load(Ordering::SeqCst)
    }

    /// Stamp provenance and path spec onto `data` and send it.
    pub fn emit_event(&self, data: EventData) -> Result<(), QueueError> {
        let event = Event::stamped(data, self.parser_chain.clone(), self.path_spec.clone());
        self.events.emit(event)
    }

    /// Report malformed data in the current input. The invocation keeps going.
    pub fn emit_error(&self, message: impl Into<String>) -> Result<(), QueueError> {
        self.send_error(ErrorKind::Item, message.into())
    }

    pub(crate) fn report_fault(&self, message: String) -> Result<(), QueueError> {
        self.send_error(ErrorKind::Invocation, message)
    }

    fn send_error(&self, kind: ErrorKind, message: String) -> Result<(), QueueError> {
        self.errors.emit(ParseError {
            path_spec: self.path_spec.clone(),
            decoder: self.decoder_name().to_string(),
            message,
            kind,
        })
    }

    pub fn lookup(&self, key: KnowledgeKey, default: Value) -> Value {
        self.knowledge.get(key, default)
    }

    /// Child mediator for a sub-decoder working on `nested`. Shares this mediator's channels.
    pub fn derive(&self, decoder_name: &str, nested: PathSpec) -> Mediator {
        let mut parser_chain = self.parser_chain.clone();
        parser_chain.push(decoder_name.to_string());
        Mediator {
            path_spec: nested,
            parser_chain,
            events: self.events.clone(),
            errors: self.errors.clone(),
            knowledge: Arc::clone(&self.knowledge),
            nested_faults: Arc::clone(&self.nested_faults),
        }
    }

    /// Run `decoder` on embedded content under a derived mediator. A fault in the nested
    /// decoder is reported and swallowed; only a closed channel is returned as an error.
    pub fn run_nested(
        &self,
        decoder: &dyn StreamDecoder,
        nested: PathSpec,
        reader: &mut dyn Read,
    ) -> Result<InvocationOutcome, QueueError> {
        let child = self.derive(decoder.name(), nested);
        match run_isolated(&child, || decoder.decode(&child, reader)) {
            InvocationOutcome::Interrupted => Err(QueueError::Closed),
            InvocationOutcome::Faulted => {
                self.nested_faults.fetch_add(1, Ordering::SeqCst);
                Ok(InvocationOutcome::Faulted)
            }
            outcome => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimestampKind;
    use crate::pipeline::Channel;

    fn mediator_with_channels() -> (Mediator, Channel<Event>, Channel<ParseError>) {
        let events = Channel::in_memory(None);
        let errors = Channel::in_memory(None);
        let m = Mediator::new(
            "outer",
            PathSpec::os("/evidence/a.gz"),
            events.producer(),
            errors.producer(),
            Arc::new(KnowledgeBase::new()),
        );
        (m, events, errors)
    }

    #[test]
    fn test_emit_event_stamps_chain_and_path_spec() {
        let (m, events, _) = mediator_with_channels();
        m.emit_event(EventData::new("test:event", 10, TimestampKind::Written))
            .unwrap();
        events.signal_end_of_stream();
        let mut got = Vec::new();
        events.consumer().drain(|e| got.push(e));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].parser_chain, vec!["outer".to_string()]);
        assert_eq!(got[0].path_spec, PathSpec::os("/evidence/a.gz"));
    }

    #[test]
    fn test_derived_mediator_extends_chain_and_shares_channels() {
        let (m, events, errors) = mediator_with_channels();
        let nested = PathSpec::nested("GZIP", None, m.path_spec().clone());
        let child = m.derive("inner", nested.clone());
        let grandchild = child.derive("leaf", nested.clone());
        grandchild
            .emit_event(EventData::new("test:event", 1, TimestampKind::Other))
            .unwrap();
        child.emit_error("bad record").unwrap();
        events.signal_end_of_stream();
        errors.signal_end_of_stream();

        let mut evs = Vec::new();
        events.consumer().drain(|e| evs.push(e));
        assert_eq!(evs[0].parser_chain, vec!["outer", "inner", "leaf"]);
        assert_eq!(evs[0].path_spec, nested);

        let mut errs = Vec::new();
        errors.consumer().drain(|e| errs.push(e));
        assert_eq!(errs[0].decoder, "inner");
        assert_eq!(errs[0].kind, ErrorKind::Item);
        assert_eq!(errs[0].path_spec, nested);
    }

    struct BrokenInner;

    impl StreamDecoder for BrokenInner {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn matches(&self, _path_spec: &PathSpec, _header: &[u8]) -> bool {
            true
        }

        fn decode(&self, _mediator: &Mediator, _reader: &mut dyn Read) -> anyhow::Result<()> {
            anyhow::bail!("truncated member")
        }
    }

    #[test]
    fn test_nested_fault_counted_on_root() {
        let (m, _events, errors) = mediator_with_channels();
        let child = m.derive("gzip", PathSpec::nested("GZIP", None, m.path_spec().clone()));
        let nested = PathSpec::nested("GZIP", Some("/a".into()), m.path_spec().clone());
        let outcome = child
            .run_nested(&BrokenInner, nested, &mut std::io::empty())
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::Faulted);
        assert_eq!(m.nested_faults(), 1);
        assert_eq!(child.nested_faults(), 1);

        errors.signal_end_of_stream();
        let mut errs = Vec::new();
        errors.consumer().drain(|e| errs.push(e));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::Invocation);
        assert_eq!(errs[0].decoder, "broken");
    }

    #[test]
    fn test_emit_after_abort_fails() {
        let (m, events, _) = mediator_with_channels();
        events.signal_abort();
        let err = m
            .emit_event(EventData::new("test:event", 1, TimestampKind::Other))
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }
}
