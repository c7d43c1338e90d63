//! Decoder plugins and the registry the engine selects them from.
//!
//! A decoder has one of two input shapes: it reads a structured [`FileEntry`], or it reads
//! a raw byte stream. The engine dispatches on [`Decoder`] with a `match`, never by probing
//! the concrete type.

pub mod bodyfile;
pub mod filestat;
pub mod gzip;

use anyhow::Result;
use std::io::Read;
use std::sync::Arc;

use crate::pipeline::Mediator;
use crate::{FileEntry, PathSpec};

pub use bodyfile::BodyfileDecoder;
pub use filestat::FileStatDecoder;
pub use gzip::GzipDecoder;

/// Decoder that works from file metadata.
pub trait FileEntryDecoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, entry: &FileEntry) -> bool;
    fn decode(&self, mediator: &Mediator, entry: &FileEntry) -> Result<()>;
}

/// Decoder that reads the artifact's bytes.
pub trait StreamDecoder: Send + Sync {
    fn name(&self) -> &'static str;
    /// Signature check on the path spec and the first bytes of the content.
    fn matches(&self, path_spec: &PathSpec, header: &[u8]) -> bool;
    fn decode(&self, mediator: &Mediator, reader: &mut dyn Read) -> Result<()>;
}

#[derive(Clone)]
pub enum Decoder {
    FileEntry(Arc<dyn FileEntryDecoder>),
    Stream(Arc<dyn StreamDecoder>),
}

impl Decoder {
    pub fn file_entry(decoder: impl FileEntryDecoder + 'static) -> Self {
        Decoder::FileEntry(Arc::new(decoder))
    }

    pub fn stream(decoder: impl StreamDecoder + 'static) -> Self {
        Decoder::Stream(Arc::new(decoder))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Decoder::FileEntry(d) => d.name(),
            Decoder::Stream(d) => d.name(),
        }
    }

    /// Whether this decoder applies to `entry` whose content starts with `header`.
    pub fn applies_to(&self, entry: &FileEntry, header: &[u8]) -> bool {
        match self {
            Decoder::FileEntry(d) => d.matches(entry),
            Decoder::Stream(d) => entry.is_file && d.matches(&entry.path_spec, header),
        }
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoder::FileEntry(d) => write!(f, "FileEntry({})", d.name()),
            Decoder::Stream(d) => write!(f, "Stream({})", d.name()),
        }
    }
}

/// Ordered set of decoders. Selection preserves registration order.
#[derive(Clone, Debug, Default)]
pub struct DecoderRegistry {
    decoders: Vec<Decoder>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `filestat`, `bodyfile`, and `gzip` (which decodes bodyfiles inside gzip members).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Decoder::file_entry(FileStatDecoder));
        registry.register(Decoder::stream(BodyfileDecoder));
        registry.register(Decoder::stream(GzipDecoder::new(vec![Arc::new(
            BodyfileDecoder,
        )])));
        registry
    }

    /// Add a decoder. A decoder with the same name is replaced.
    pub fn register(&mut self, decoder: Decoder) {
        match self.decoders.iter_mut().find(|d| d.name() == decoder.name()) {
            Some(slot) => *slot = decoder,
            None => self.decoders.push(decoder),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Decoder> {
        self.decoders.iter().find(|d| d.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(Decoder::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Names in `wanted` that are not registered.
    pub fn unknown_names<'a>(&self, wanted: &'a [String]) -> Vec<&'a str> {
        wanted
            .iter()
            .map(String::as_str)
            .filter(|w| self.get(w).is_none())
            .collect()
    }

    /// Decoders applicable to `entry`. A non-empty `only` restricts the candidates by name.
    pub fn select(&self, entry: &FileEntry, header: &[u8], only: &[String]) -> Vec<Decoder> {
        self.decoders
            .iter()
            .filter(|d| only.is_empty() || only.iter().any(|n| n == d.name()))
            .filter(|d| d.applies_to(entry, header))
            .cloned()
            .collect()
    }
}

/// Parse a `secs[.fraction]` epoch string into microseconds. `None` for malformed input.
pub fn parse_epoch_micros(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (secs, frac) = match raw.split_once('.') {
        Some((s, f)) => (s, f),
        None => (raw, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut micros = 0i64;
    for (i, b) in frac.bytes().take(6).enumerate() {
        micros += i64::from(b - b'0') * 10i64.pow(5 - i as u32);
    }
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    secs.checked_mul(1_000_000)?.checked_add(sign * micros)
}
