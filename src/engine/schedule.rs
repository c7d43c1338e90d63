//! Scheduling: open each resolved input, sniff its header and pair it with the decoders
//! that apply to it.

use log::{debug, warn};
use std::io::{self, Read};
use std::sync::Arc;

use crate::decoders::{Decoder, DecoderRegistry};
use crate::utils::config::{ENGINE_DECODER_NAME, HEADER_SNIFF_LEN};
use crate::vfs::FileSystem;
use crate::{ErrorKind, FileEntry, ParseError, PathSpec};

/// One decoder applied to one input.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub decoder: Decoder,
    pub entry: Arc<FileEntry>,
}

impl Invocation {
    pub fn path_spec(&self) -> &PathSpec {
        &self.entry.path_spec
    }
}

/// Result of scheduling all inputs of a run.
#[derive(Debug, Default)]
pub struct Schedule {
    pub invocations: Vec<Invocation>,
    /// Inputs that could not be opened (non-strict mode).
    pub input_errors: Vec<ParseError>,
    /// First unreadable input in strict mode. Nothing after it was scheduled.
    pub fatal: Option<String>,
}

fn read_header(fs: &dyn FileSystem, spec: &PathSpec) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_SNIFF_LEN);
    fs.open_stream(spec)?
        .take(HEADER_SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

fn open_input(fs: &dyn FileSystem, spec: &PathSpec) -> io::Result<(FileEntry, Vec<u8>)> {
    let entry = fs.open_entry(spec)?;
    let header = if entry.is_file {
        read_header(fs, spec)?
    } else {
        Vec::new()
    };
    Ok((entry, header))
}

/// Build the invocation list for `specs`, in input order and registry order within an input.
pub fn schedule(
    fs: &dyn FileSystem,
    registry: &DecoderRegistry,
    specs: &[PathSpec],
    only: &[String],
    strict: bool,
) -> Schedule {
    let mut out = Schedule::default();
    for spec in specs {
        let (entry, header) = match open_input(fs, spec) {
            Ok(opened) => opened,
            Err(e) if strict => {
                out.fatal = Some(format!("strict mode: cannot read {spec}: {e}"));
                break;
            }
            Err(e) => {
                warn!("Cannot read {}: {}", spec, e);
                out.input_errors.push(ParseError {
                    path_spec: spec.clone(),
                    decoder: ENGINE_DECODER_NAME.to_string(),
                    message: format!("cannot read input: {e}"),
                    kind: ErrorKind::Input,
                });
                continue;
            }
        };
        let decoders = registry.select(&entry, &header, only);
        if decoders.is_empty() {
            debug!("No decoder for {}", spec);
            continue;
        }
        let entry = Arc::new(entry);
        out.invocations
            .extend(decoders.into_iter().map(|decoder| Invocation {
                decoder,
                entry: Arc::clone(&entry),
            }));
    }
    debug!(
        "Scheduled {} invocations over {} inputs",
        out.invocations.len(),
        specs.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::OsFileSystem;
    use tempfile::tempdir;

    #[test]
    fn test_unreadable_input_reported_or_fatal() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.body");
        std::fs::write(&good, "0|/x|1|r|0|0|1|1|2|3|4\n").unwrap();
        let specs = vec![PathSpec::os(dir.path().join("gone.body")), PathSpec::os(&good)];
        let fs = OsFileSystem::default();
        let registry = DecoderRegistry::with_builtins();

        let lenient = schedule(&fs, &registry, &specs, &[], false);
        assert_eq!(lenient.input_errors.len(), 1);
        assert_eq!(lenient.input_errors[0].kind, ErrorKind::Input);
        assert_eq!(lenient.input_errors[0].decoder, ENGINE_DECODER_NAME);
        let names: Vec<_> = lenient.invocations.iter().map(|i| i.decoder.name()).collect();
        assert_eq!(names, vec!["filestat", "bodyfile"]);

        let strict = schedule(&fs, &registry, &specs, &[], true);
        assert!(strict.fatal.is_some());
        assert!(strict.invocations.is_empty());
    }
}
