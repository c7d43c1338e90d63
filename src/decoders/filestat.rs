//! File system metadata decoder: one event per known timestamp of a file entry.

use anyhow::Result;
use serde_json::Value;

use super::FileEntryDecoder;
use crate::knowledge::KnowledgeKey;
use crate::pipeline::Mediator;
use crate::{EventData, FileEntry, TimestampKind};

pub const DATA_TYPE: &str = "fs:stat";

pub struct FileStatDecoder;

impl FileEntryDecoder for FileStatDecoder {
    fn name(&self) -> &'static str {
        "filestat"
    }

    fn matches(&self, entry: &FileEntry) -> bool {
        entry.is_file
    }

    fn decode(&self, mediator: &Mediator, entry: &FileEntry) -> Result<()> {
        let hostname = mediator.lookup(KnowledgeKey::Hostname, Value::Null);
        let stamps = [
            (entry.created, TimestampKind::Creation),
            (entry.accessed, TimestampKind::Access),
            (entry.modified, TimestampKind::Modification),
            (entry.changed, TimestampKind::Change),
        ];
        for (ts, kind) in stamps {
            // Zero means "not set" on most file systems.
            let Some(ts) = ts.filter(|t| *t != 0) else {
                continue;
            };
            let mut data = EventData::new(DATA_TYPE, ts, kind)
                .with("file_name", entry.name.as_str())
                .with("file_size", entry.size);
            if !hostname.is_null() {
                data = data.with("hostname", hostname.clone());
            }
            mediator.emit_event(data)?;
        }
        Ok(())
    }
}
