//! Channel contract shared by the in-memory and serializing variants.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::memory::MemoryQueue;
use super::producer::{Consumer, Producer};
use super::serialized;
use crate::QueueKind;

/// Result of a receive. End-of-stream and abort are explicit, never an empty item.
#[derive(Debug, PartialEq)]
pub enum Received<T> {
    Item(T),
    EndOfStream,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The channel already saw end-of-stream or abort.
    #[error("channel closed")]
    Closed,
    #[error("channel transport failed: {0}")]
    Transport(#[from] std::io::Error),
    #[error("channel frame encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Send side of a channel.
pub trait QueueWriter<T>: Send + Sync {
    /// Enqueue `item`, blocking while a bounded channel is full.
    fn send(&self, item: T) -> Result<(), QueueError>;
    /// No further sends. Idempotent.
    fn signal_end_of_stream(&self);
    /// Stop everything now. Idempotent.
    fn signal_abort(&self);
}

/// Receive side of a channel.
pub trait QueueReader<T>: Send + Sync {
    fn receive(&self) -> Received<T>;
    /// Like [`receive`](Self::receive) but returns `None` instead of blocking.
    fn try_receive(&self) -> Option<Received<T>>;
    fn signal_abort(&self);
}

/// Both halves of one channel. Cheap to clone; clones refer to the same channel.
pub struct Channel<T> {
    writer: Arc<dyn QueueWriter<T>>,
    reader: Arc<dyn QueueReader<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            reader: Arc::clone(&self.reader),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// In-process channel. `None` capacity means unbounded.
    pub fn in_memory(capacity: Option<usize>) -> Self {
        let queue = Arc::new(MemoryQueue::new(capacity));
        Self {
            writer: queue.clone(),
            reader: queue,
        }
    }

    pub fn producer(&self) -> Producer<T> {
        Producer::new(Arc::clone(&self.writer))
    }

    pub fn consumer(&self) -> Consumer<T> {
        Consumer::new(Arc::clone(&self.reader))
    }

    pub fn signal_end_of_stream(&self) {
        self.writer.signal_end_of_stream();
    }

    /// Abort both halves: receivers first so buffered items are dropped at once.
    pub fn signal_abort(&self) {
        self.reader.signal_abort();
        self.writer.signal_abort();
    }
}

impl<T> Channel<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Channel whose items cross an OS pipe as serialized frames.
    pub fn over_pipe(capacity: Option<usize>) -> Result<Self, QueueError> {
        let (reader, writer) = std::io::pipe()?;
        Ok(Self {
            writer: Arc::new(serialized::FrameWriter::new(writer)),
            reader: Arc::new(serialized::FrameReader::spawn(reader, capacity)?),
        })
    }

    /// Pick the variant from `kind`.
    pub fn new(kind: QueueKind, capacity: Option<usize>) -> Result<Self, QueueError> {
        match kind {
            QueueKind::Memory => Ok(Self::in_memory(capacity)),
            QueueKind::Pipe => Self::over_pipe(capacity),
        }
    }
}

/// Anything the engine can abort when the run is cancelled.
pub trait Abortable: Send + Sync {
    fn abort(&self);
}

impl<T: Send + 'static> Abortable for Channel<T> {
    fn abort(&self) {
        self.signal_abort();
    }
}
