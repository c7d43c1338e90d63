//! Producer and consumer wrappers around the two halves of a channel.

use std::sync::Arc;

use super::queue::{QueueError, QueueReader, QueueWriter, Received};

/// How a drain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainStatus {
    /// End-of-stream reached and everything buffered was handled.
    Complete,
    /// Abort seen; consumption is incomplete.
    Aborted,
}

/// Send side used by decoder invocations. Cannot abort the channel.
pub struct Producer<T> {
    queue: Arc<dyn QueueWriter<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Producer<T> {
    pub fn new(queue: Arc<dyn QueueWriter<T>>) -> Self {
        Self { queue }
    }

    pub fn emit(&self, item: T) -> Result<(), QueueError> {
        self.queue.send(item)
    }

    /// Emit in iteration order; stops at the first failed send.
    pub fn emit_all<I>(&self, items: I) -> Result<usize, QueueError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut sent = 0;
        for item in items {
            self.queue.send(item)?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn close(&self) {
        self.queue.signal_end_of_stream();
    }
}

/// Receive side used by collectors and sinks.
pub struct Consumer<T> {
    queue: Arc<dyn QueueReader<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Consumer<T> {
    pub fn new(queue: Arc<dyn QueueReader<T>>) -> Self {
        Self { queue }
    }

    /// Hand every item to `handler` until end-of-stream or abort.
    pub fn drain<F>(&self, mut handler: F) -> DrainStatus
    where
        F: FnMut(T),
    {
        loop {
            match self.queue.receive() {
                Received::Item(item) => handler(item),
                Received::EndOfStream => return DrainStatus::Complete,
                Received::Aborted => return DrainStatus::Aborted,
            }
        }
    }

    /// Like [`drain`](Self::drain) but stops at the first handler error.
    pub fn try_drain<F, E>(&self, mut handler: F) -> Result<DrainStatus, E>
    where
        F: FnMut(T) -> Result<(), E>,
    {
        loop {
            match self.queue.receive() {
                Received::Item(item) => handler(item)?,
                Received::EndOfStream => return Ok(DrainStatus::Complete),
                Received::Aborted => return Ok(DrainStatus::Aborted),
            }
        }
    }

    /// Handle what is buffered right now without blocking. `None` means the queue ran dry
    /// and more may still arrive.
    pub fn drain_available<F, E>(&self, mut handler: F) -> Result<Option<DrainStatus>, E>
    where
        F: FnMut(T) -> Result<(), E>,
    {
        while let Some(received) = self.queue.try_receive() {
            match received {
                Received::Item(item) => handler(item)?,
                Received::EndOfStream => return Ok(Some(DrainStatus::Complete)),
                Received::Aborted => return Ok(Some(DrainStatus::Aborted)),
            }
        }
        Ok(None)
    }
}
