//! Bodyfile decoder (SleuthKit 3.x, `MD5|name|inode|mode|UID|GID|size|atime|mtime|ctime|crtime`).
//!
//! Each record yields up to four events in the order modification, access, creation, change.
//! A malformed record is reported through the mediator and decoding continues.

use anyhow::{Context, Result};
use serde_json::Value;
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};

use super::{StreamDecoder, parse_epoch_micros};
use crate::knowledge::KnowledgeKey;
use crate::pipeline::Mediator;
use crate::{EventData, PathSpec, TimestampKind};

pub const DATA_TYPE: &str = "fs:bodyfile";
const FIELD_COUNT: usize = 11;

pub struct BodyfileDecoder;

fn looks_like_record(line: &str) -> bool {
    line.split('|').count() == FIELD_COUNT
}

impl StreamDecoder for BodyfileDecoder {
    fn name(&self) -> &'static str {
        "bodyfile"
    }

    fn matches(&self, path_spec: &PathSpec, header: &[u8]) -> bool {
        let by_name = path_spec
            .file_name()
            .is_some_and(|n| n.ends_with(".body") || n.ends_with(".bodyfile"));
        let first_line = header
            .split(|b| *b == b'\n')
            .find(|l| !l.is_empty() && !l.starts_with(b"#"));
        let by_content = match first_line.map(std::str::from_utf8) {
            Some(Ok(line)) => looks_like_record(line.trim_end_matches('\r')),
            // Header cut in the middle of a multi-byte char; trust the name.
            _ => false,
        };
        by_name || by_content
    }

    fn decode(&self, mediator: &Mediator, reader: &mut dyn Read) -> Result<()> {
        let hostname = mediator.lookup(KnowledgeKey::Hostname, Value::Null);
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        let mut line_no: usize = 0;
        loop {
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .with_context(|| format!("read bodyfile line {}", line_no + 1))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            let decoded = String::from_utf8_lossy(&raw);
            if matches!(decoded, Cow::Owned(_)) {
                mediator.emit_error(format!("line {line_no}: invalid UTF-8, decoded lossily"))?;
            }
            let line = decoded.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != FIELD_COUNT {
                mediator.emit_error(format!(
                    "line {line_no}: expected {FIELD_COUNT} fields, found {}",
                    fields.len()
                ))?;
                continue;
            }
            let stamps = [
                (fields[8], TimestampKind::Modification),
                (fields[7], TimestampKind::Access),
                (fields[10], TimestampKind::Creation),
                (fields[9], TimestampKind::Change),
            ];
            for (raw, kind) in stamps {
                let ts = match parse_epoch_micros(raw) {
                    Some(0) => continue,
                    Some(ts) => ts,
                    None => {
                        mediator.emit_error(format!(
                            "line {line_no}: invalid {} timestamp {raw:?}",
                            kind.description()
                        ))?;
                        continue;
                    }
                };
                let mut data = EventData::new(DATA_TYPE, ts, kind)
                    .with("filename", fields[1])
                    .with("inode", fields[2])
                    .with("mode", fields[3])
                    .with("line", line_no);
                if let Ok(size) = fields[6].parse::<u64>() {
                    data = data.with("size", size);
                }
                if let (Ok(uid), Ok(gid)) = (fields[4].parse::<u64>(), fields[5].parse::<u64>()) {
                    data = data.with("uid", uid).with("gid", gid);
                }
                if fields[0] != "0" && !fields[0].is_empty() {
                    data = data.with("md5", fields[0]);
                }
                if !hostname.is_null() {
                    data = data.with("hostname", hostname.clone());
                }
                mediator.emit_event(data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_content_or_name() {
        let d = BodyfileDecoder;
        let rec = b"0|/etc/passwd|2331|r/rrw-r--r--|0|0|11776|1|2|3|4\n";
        assert!(d.matches(&PathSpec::os("/tmp/x.txt"), rec));
        assert!(d.matches(&PathSpec::os("/tmp/x.body"), b"garbage"));
        assert!(!d.matches(&PathSpec::os("/tmp/x.txt"), b"hello world\n"));
        assert!(!d.matches(&PathSpec::os("/tmp/x.txt"), &[0x1f, 0x8b, 0x08]));
    }
}
