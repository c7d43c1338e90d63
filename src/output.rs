//! Event sinks: where the engine's collector delivers events and errors.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io::Write;

use crate::{Event, ParseError, RunSummary};

/// Receives drained output. Called from the engine's collector threads, never concurrently.
pub trait EventSink: Send {
    fn write_event(&mut self, event: Event) -> Result<()>;
    fn write_error(&mut self, error: ParseError) -> Result<()>;
    /// Called once after draining, also for aborted runs.
    fn finish(&mut self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

/// Keeps everything in memory (batch API and tests).
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
    pub summary: Option<RunSummary>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for CollectingSink {
    fn write_event(&mut self, event: Event) -> Result<()> {
        self.events.push(event);
        Ok(())
    }

    fn write_error(&mut self, error: ParseError) -> Result<()> {
        self.errors.push(error);
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

/// Render microseconds since the epoch as RFC 3339 (UTC). `None` when out of chrono's range.
pub fn format_timestamp(micros: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Event {
        datetime: Option<String>,
        timestamp_desc: &'static str,
        parser: String,
        #[serde(flatten)]
        event: &'a Event,
    },
    Error(&'a ParseError),
    Summary(&'a RunSummary),
}

/// One JSON object per line. Errors and the final summary are tagged with `record`.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
    with_errors: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            with_errors: true,
        }
    }

    /// Leave parse errors out of the stream (they are still counted).
    pub fn events_only(mut self) -> Self {
        self.with_errors = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &JsonRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record).context("serialize output record")?;
        self.out.write_all(b"\n").context("write output record")?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn write_event(&mut self, event: Event) -> Result<()> {
        let record = JsonRecord::Event {
            datetime: format_timestamp(event.timestamp),
            timestamp_desc: event.timestamp_kind.description(),
            parser: event.parser(),
            event: &event,
        };
        self.write_record(&record)
    }

    fn write_error(&mut self, error: ParseError) -> Result<()> {
        if !self.with_errors {
            return Ok(());
        }
        self.write_record(&JsonRecord::Error(&error))
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.write_record(&JsonRecord::Summary(summary))?;
        self.out.flush().context("flush output")
    }
}

/// Buffers events and forwards them to `inner` ordered by timestamp when the run finishes.
/// Ties keep arrival order. Errors are forwarded immediately.
pub struct SortingSink<S: EventSink> {
    inner: S,
    pending: Vec<Event>,
}

impl<S: EventSink> SortingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: EventSink> EventSink for SortingSink<S> {
    fn write_event(&mut self, event: Event) -> Result<()> {
        self.pending.push(event);
        Ok(())
    }

    fn write_error(&mut self, error: ParseError) -> Result<()> {
        self.inner.write_error(error)
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.pending.sort_by_key(|e| e.timestamp);
        for event in self.pending.drain(..) {
            self.inner.write_event(event)?;
        }
        self.inner.finish(summary)
    }
}
