use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use timeliner::knowledge::{KnowledgeBase, KnowledgeKey};
use timeliner::pipeline::{Channel, DrainStatus, Mediator, QueueError};
use timeliner::{Event, EventData, ParseError, PathSpec, QueueKind, TimestampKind};

fn event_at(m: &Mediator, ts: i64) {
    m.emit_event(EventData::new("test:seq", ts, TimestampKind::Other))
        .unwrap();
}

fn mediator(name: &str, events: &Channel<Event>, errors: &Channel<ParseError>) -> Mediator {
    Mediator::new(
        name,
        PathSpec::os(format!("/evidence/{name}")),
        events.producer(),
        errors.producer(),
        Arc::new(KnowledgeBase::new()),
    )
}

// --- order preservation ---

fn assert_per_producer_order(kind: QueueKind) {
    let events: Channel<Event> = Channel::new(kind, Some(8)).unwrap();
    let errors: Channel<ParseError> = Channel::new(kind, Some(8)).unwrap();
    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let m = mediator(name, &events, &errors);
            thread::spawn(move || {
                for ts in 0..200 {
                    event_at(&m, ts);
                }
            })
        })
        .collect();
    let closer_events = events.clone();
    let closer = thread::spawn(move || {
        for h in handles {
            h.join().unwrap();
        }
        closer_events.signal_end_of_stream();
    });

    let mut got = Vec::new();
    let status = events.consumer().drain(|e| got.push(e));
    closer.join().unwrap();
    assert_eq!(status, DrainStatus::Complete);
    assert_eq!(got.len(), 600);
    for name in ["a", "b", "c"] {
        let seq: Vec<i64> = got
            .iter()
            .filter(|e| e.path_spec.file_name() == Some(name))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(seq, (0..200).collect::<Vec<_>>(), "order for {name}");
    }
}

#[test]
fn test_order_preserved_per_producer_in_memory() {
    assert_per_producer_order(QueueKind::Memory);
}

#[test]
fn test_order_preserved_per_producer_over_pipe() {
    assert_per_producer_order(QueueKind::Pipe);
}

// --- abort short-circuit ---

#[test]
fn test_abort_short_circuits_buffered_items() {
    for kind in [QueueKind::Memory, QueueKind::Pipe] {
        let channel: Channel<u32> = Channel::new(kind, None).unwrap();
        let producer = channel.producer();
        producer.emit_all(0..10).unwrap();
        channel.signal_abort();
        let consumer = channel.consumer();
        let mut seen = Vec::new();
        assert_eq!(consumer.drain(|i| seen.push(i)), DrainStatus::Aborted);
        assert!(seen.is_empty(), "{kind:?} delivered items after abort");
        assert!(matches!(producer.emit(11), Err(QueueError::Closed)));
    }
}

#[test]
fn test_receive_after_end_of_stream_and_idempotent_signals() {
    let channel: Channel<u32> = Channel::in_memory(Some(2));
    channel.producer().emit(1).unwrap();
    channel.signal_end_of_stream();
    channel.signal_end_of_stream();
    let consumer = channel.consumer();
    let mut seen = Vec::new();
    assert_eq!(consumer.drain(|i| seen.push(i)), DrainStatus::Complete);
    assert_eq!(seen, vec![1]);
    assert!(matches!(channel.producer().emit(2), Err(QueueError::Closed)));
}

#[test]
fn test_pipe_end_of_stream_reaches_reader() {
    let channel: Channel<String> = Channel::over_pipe(Some(4)).unwrap();
    let producer = channel.producer();
    let writer = thread::spawn(move || {
        producer.emit("first".to_string()).unwrap();
        producer.emit("second".to_string()).unwrap();
        producer.close();
    });
    let mut got = Vec::new();
    let status = channel.consumer().drain(|s| got.push(s));
    writer.join().unwrap();
    assert_eq!(status, DrainStatus::Complete);
    assert_eq!(got, vec!["first", "second"]);
}

// --- provenance ---

#[test]
fn test_provenance_chain_across_nested_mediators() {
    let events: Channel<Event> = Channel::in_memory(None);
    let errors: Channel<ParseError> = Channel::in_memory(None);
    let outer = mediator("gzip", &events, &errors);
    let nested = PathSpec::nested("GZIP", Some("/x".into()), outer.path_spec().clone());
    let inner = outer.derive("bodyfile", nested.clone());
    event_at(&outer, 1);
    event_at(&inner, 2);
    inner.emit_error("bad line").unwrap();
    events.signal_end_of_stream();
    errors.signal_end_of_stream();

    let mut got = Vec::new();
    events.consumer().drain(|e| got.push(e));
    assert_eq!(got[0].parser(), "gzip");
    assert_eq!(got[1].parser(), "gzip/bodyfile");
    assert_eq!(got[1].path_spec, nested);
    assert_eq!(got[1].path_spec.depth(), 2);

    let mut errs = Vec::new();
    errors.consumer().drain(|e| errs.push(e));
    assert_eq!(errs[0].decoder, "bodyfile");
    assert_eq!(errs[0].path_spec, nested);
}

// --- knowledge defaults ---

#[test]
fn test_lookup_defaults_when_unset() {
    let events: Channel<Event> = Channel::in_memory(None);
    let errors: Channel<ParseError> = Channel::in_memory(None);
    let mut kb = KnowledgeBase::new();
    kb.set(KnowledgeKey::Hostname, "wks-01");
    let m = Mediator::new(
        "sniffer",
        PathSpec::os("/x"),
        events.producer(),
        errors.producer(),
        Arc::new(kb),
    );
    assert_eq!(
        m.lookup(KnowledgeKey::Hostname, serde_json::Value::Null),
        serde_json::json!("wks-01")
    );
    assert_eq!(
        m.lookup(KnowledgeKey::CodePage, serde_json::json!("cp1252")),
        serde_json::json!("cp1252")
    );
}

// --- round-trip fidelity over the serializing channel ---

fn nested_spec(locations: &[String]) -> PathSpec {
    let mut spec = PathSpec::os(&locations[0]).with_inode(7);
    for (i, loc) in locations[1..].iter().enumerate() {
        spec = PathSpec::nested("GZIP", Some(loc.clone()), spec).with_offset(i as u64 * 512);
    }
    spec
}

fn finite_f64() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

fn attribute_value() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        any::<u64>().prop_map(serde_json::Value::from),
        finite_f64().prop_map(serde_json::Value::from),
        ".{0,16}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_event_survives_pipe(
        locations in prop::collection::vec("[a-z/._-]{1,24}", 1..8),
        ts in any::<i64>(),
        note in ".{0,40}",
        ratio in finite_f64(),
        extra in attribute_value(),
    ) {
        let events: Channel<Event> = Channel::over_pipe(None).unwrap();
        let errors: Channel<ParseError> = Channel::in_memory(None);
        let m = Mediator::new(
            "prop",
            nested_spec(&locations),
            events.producer(),
            errors.producer(),
            Arc::new(KnowledgeBase::new()),
        );
        let data = EventData::new("test:prop", ts, TimestampKind::Written)
            .with("note", note.as_str())
            .with("ratio", ratio)
            .with("extra", extra.clone());
        let sent = data.attributes.clone();
        m.emit_event(data).unwrap();
        events.signal_end_of_stream();

        let consumer = events.consumer();
        let mut got = Vec::new();
        prop_assert_eq!(consumer.drain(|e| got.push(e)), DrainStatus::Complete);
        prop_assert_eq!(got.len(), 1);
        prop_assert_eq!(got[0].path_spec.depth(), locations.len());
        prop_assert_eq!(&got[0].path_spec, &nested_spec(&locations));
        prop_assert_eq!(got[0].timestamp, ts);
        prop_assert_eq!(&got[0].attributes, &sent);
        prop_assert_eq!(got[0].attribute("ratio").and_then(|v| v.as_f64()), Some(ratio));
    }
}

#[test]
fn test_pipe_keeps_float_bits() {
    let values = [
        1.0715660391465826e-75,
        -1.81996730402717e-179,
        -1.603964615428183e143,
        -9.643915712060552e-234,
        f64::MIN_POSITIVE,
        f64::MAX,
        0.1 + 0.2,
    ];
    let channel: Channel<serde_json::Value> = Channel::over_pipe(None).unwrap();
    channel
        .producer()
        .emit_all(values.iter().map(|v| serde_json::json!({ "v": v })))
        .unwrap();
    channel.signal_end_of_stream();
    let mut got = Vec::new();
    channel.consumer().drain(|v| got.push(v["v"].as_f64().unwrap()));
    let bits: Vec<u64> = got.iter().map(|v| v.to_bits()).collect();
    let expected: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits, expected);
}

#[test]
fn test_try_receive_reports_state_without_blocking() {
    let channel: Channel<u8> = Channel::in_memory(None);
    let consumer = channel.consumer();
    assert_eq!(consumer.drain_available(|_| Ok::<_, ()>(())), Ok(None));
    channel.producer().emit(1).unwrap();
    channel.signal_end_of_stream();
    let mut seen = Vec::new();
    assert_eq!(
        consumer.drain_available(|i| {
            seen.push(i);
            Ok::<_, ()>(())
        }),
        Ok(Some(DrainStatus::Complete))
    );
    assert_eq!(seen, vec![1]);
}
