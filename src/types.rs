//! Public and internal types for the timeliner API and pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Type indicator for a plain file on the host filesystem.
pub const TYPE_INDICATOR_OS: &str = "OS";
/// Type indicator for the decompressed content of a gzip member.
pub const TYPE_INDICATOR_GZIP: &str = "GZIP";

/// Where an artifact's bytes come from. Containers nest by owning their parent.
///
/// Immutable once built; nested invocations get a clone, never a shared reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSpec {
    pub type_indicator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inode: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<PathSpec>>,
}

impl PathSpec {
    /// Path spec for a file on the host filesystem.
    pub fn os(path: impl AsRef<Path>) -> Self {
        Self {
            type_indicator: TYPE_INDICATOR_OS.to_string(),
            location: Some(path.as_ref().to_string_lossy().into_owned()),
            inode: None,
            offset: None,
            parent: None,
        }
    }

    /// Path spec for something living inside `parent`.
    pub fn nested(type_indicator: &str, location: Option<String>, parent: PathSpec) -> Self {
        Self {
            type_indicator: type_indicator.to_string(),
            location,
            inode: None,
            offset: None,
            parent: Some(Box::new(parent)),
        }
    }

    pub fn with_inode(mut self, inode: u64) -> Self {
        self.inode = Some(inode);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Number of specs in the chain, counting this one.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// Outermost container (`self` when it has no parent).
    pub fn root(&self) -> &PathSpec {
        match &self.parent {
            Some(p) => p.root(),
            None => self,
        }
    }

    pub fn is_os(&self) -> bool {
        self.type_indicator == TYPE_INDICATOR_OS
    }

    /// Host path for an OS spec.
    pub fn os_path(&self) -> Option<PathBuf> {
        match (self.is_os(), &self.location) {
            (true, Some(loc)) => Some(PathBuf::from(loc)),
            _ => None,
        }
    }

    /// Last path component of the location, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.location
            .as_deref()
            .and_then(|l| l.rsplit(['/', '\\']).find(|s| !s.is_empty()))
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.type_indicator)?;
        if let Some(loc) = &self.location {
            write!(f, "{loc}")?;
        }
        if let Some(inode) = self.inode {
            write!(f, "#{inode}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, "@{offset}")?;
        }
        if let Some(parent) = &self.parent {
            write!(f, " <- {parent}")?;
        }
        Ok(())
    }
}

/// What a timestamp means for the source item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    Creation,
    Access,
    Modification,
    Written,
    /// Metadata (inode) change.
    Change,
    Other,
}

impl TimestampKind {
    pub fn description(&self) -> &'static str {
        match self {
            TimestampKind::Creation => "Creation Time",
            TimestampKind::Access => "Last Access Time",
            TimestampKind::Modification => "Content Modification Time",
            TimestampKind::Written => "Written Time",
            TimestampKind::Change => "Metadata Modification Time",
            TimestampKind::Other => "Time",
        }
    }
}

/// Ordered attribute map of an event. Keys are unique.
pub type Attributes = BTreeMap<String, Value>;

/// What a decoder produces. Provenance is added by the mediator, not here.
#[derive(Clone, Debug, PartialEq)]
pub struct EventData {
    pub timestamp: i64,
    pub timestamp_kind: TimestampKind,
    pub data_type: String,
    pub attributes: Attributes,
}

impl EventData {
    pub fn new(data_type: &str, timestamp: i64, timestamp_kind: TimestampKind) -> Self {
        Self {
            timestamp,
            timestamp_kind,
            data_type: data_type.to_string(),
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute, replacing any previous value under `key`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// A normalized, provenance-stamped timeline event.
///
/// Only [`Mediator::emit_event`](crate::pipeline::Mediator::emit_event) builds these, so
/// `parser_chain` is never empty and `path_spec` is always present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    pub timestamp_kind: TimestampKind,
    pub data_type: String,
    pub parser_chain: Vec<String>,
    pub path_spec: PathSpec,
    pub attributes: Attributes,
}

impl Event {
    pub(crate) fn stamped(data: EventData, parser_chain: Vec<String>, path_spec: PathSpec) -> Self {
        debug_assert!(!parser_chain.is_empty());
        Self {
            id: Uuid::new_v4(),
            timestamp: data.timestamp,
            timestamp_kind: data.timestamp_kind,
            data_type: data.data_type,
            parser_chain,
            path_spec,
            attributes: data.attributes,
        }
    }

    /// Provenance chain joined with `/`, e.g. `gzip/bodyfile`.
    pub fn parser(&self) -> String {
        self.parser_chain.join("/")
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Which layer a parse error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed data inside one artifact; the invocation kept going.
    Item,
    /// The decoder gave up on its input; output sent before the fault stays valid.
    Invocation,
    /// The input could not be opened or read for scheduling.
    Input,
}

/// Terminal report of a decode problem. Not retried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub path_spec: PathSpec,
    pub decoder: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.decoder, self.message, self.path_spec)
    }
}

/// Structured handle returned by the filesystem layer. Timestamps in microseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    pub path_spec: PathSpec,
    pub name: String,
    pub size: u64,
    pub is_file: bool,
    pub created: Option<i64>,
    pub accessed: Option<i64>,
    pub modified: Option<i64>,
    pub changed: Option<i64>,
}

/// How decoder invocations are scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One invocation at a time, output drained on the same thread. Deterministic.
    Sequential,
    /// Fixed pool of worker threads. `None` derives the count from the machine.
    Parallel { workers: Option<usize> },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Parallel { workers: None }
    }
}

/// Which channel implementation the engine uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// In-process queue.
    #[default]
    Memory,
    /// Frames serialized through an OS pipe (IPC-safe).
    Pipe,
}

/// Engine options (lib and CLI).
#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub mode: ExecutionMode,
    pub queue_kind: QueueKind,
    /// Bound for event/error channels in parallel mode. `None` uses the default cap.
    pub queue_capacity: Option<usize>,
    /// Only run decoders with these names. Empty means all that match.
    pub decoders: Vec<String>,
    /// Exclude patterns (glob syntax) applied while expanding directories.
    pub exclude: Vec<String>,
    pub follow_links: bool,
    /// Strict mode: an unreadable input aborts the run instead of being reported.
    pub strict: bool,
    /// Show a progress counter (CLI).
    pub verbose: bool,
}

/// Per-run state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Resolving,
    Scheduling,
    Running,
    Draining,
    Done,
    Aborted,
}

impl RunState {
    /// Legal transitions of a run.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Scheduling)
                | (Scheduling, Running)
                | (Running, Draining)
                | (Draining, Done)
                | (Scheduling | Running | Draining, Aborted)
        )
    }
}

/// Outcome counters of one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub state: RunState,
    pub inputs: usize,
    pub invocations: usize,
    pub events: usize,
    pub errors: usize,
    /// Invocations that ended in a decoder fault.
    pub faults: usize,
    pub abort_reason: Option<String>,
}

impl RunSummary {
    pub fn aborted(&self) -> bool {
        self.state == RunState::Aborted
    }
}
