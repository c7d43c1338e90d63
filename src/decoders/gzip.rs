//! Gzip container decoder. Decompresses the stream and hands the content to the first inner
//! decoder whose signature matches, under a nested path spec.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::io::{Cursor, Read};
use std::sync::Arc;

use super::StreamDecoder;
use crate::pipeline::Mediator;
use crate::utils::config::HEADER_SNIFF_LEN;
use crate::{PathSpec, TYPE_INDICATOR_GZIP};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub struct GzipDecoder {
    inner: Vec<Arc<dyn StreamDecoder>>,
}

impl GzipDecoder {
    pub fn new(inner: Vec<Arc<dyn StreamDecoder>>) -> Self {
        Self { inner }
    }

    /// Inner location: the outer name without its `.gz` suffix.
    fn inner_location(outer: &PathSpec) -> Option<String> {
        let name = outer.file_name()?;
        let stripped = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".gzip"))
            .unwrap_or(name);
        Some(format!("/{stripped}"))
    }
}

impl StreamDecoder for GzipDecoder {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn matches(&self, _path_spec: &PathSpec, header: &[u8]) -> bool {
        header.starts_with(&GZIP_MAGIC)
    }

    fn decode(&self, mediator: &Mediator, reader: &mut dyn Read) -> Result<()> {
        let mut gz = MultiGzDecoder::new(reader);
        let mut head = Vec::with_capacity(HEADER_SNIFF_LEN);
        (&mut gz)
            .take(HEADER_SNIFF_LEN as u64)
            .read_to_end(&mut head)
            .context("decompress gzip header")?;

        let nested = PathSpec::nested(
            TYPE_INDICATOR_GZIP,
            Self::inner_location(mediator.path_spec()),
            mediator.path_spec().clone(),
        );
        let Some(inner) = self.inner.iter().find(|d| d.matches(&nested, &head)) else {
            mediator.emit_error("no decoder recognizes the decompressed content")?;
            return Ok(());
        };
        let mut content = Cursor::new(head).chain(gz);
        mediator.run_nested(inner.as_ref(), nested, &mut content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_location_strips_suffix() {
        let spec = PathSpec::os("/cases/host/a.body.gz");
        assert_eq!(GzipDecoder::inner_location(&spec).as_deref(), Some("/a.body"));
        let spec = PathSpec::os("/cases/host/blob");
        assert_eq!(GzipDecoder::inner_location(&spec).as_deref(), Some("/blob"));
    }

    #[test]
    fn test_matches_magic_only() {
        let d = GzipDecoder::new(Vec::new());
        assert!(d.matches(&PathSpec::os("/x"), &[0x1f, 0x8b, 0x08, 0x00]));
        assert!(!d.matches(&PathSpec::os("/x.gz"), b"plain"));
    }
}
