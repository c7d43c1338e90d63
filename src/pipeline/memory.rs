//! In-process queue on top of crossbeam channels.
//!
//! End-of-stream and abort are broadcast by dropping the sender of a wake-up channel:
//! every receiver blocked in `select!` sees the disconnect at once.

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use super::queue::{QueueError, QueueReader, QueueWriter, Received};

pub struct MemoryQueue<T> {
    data_tx: Sender<T>,
    data_rx: Receiver<T>,
    closed: AtomicBool,
    aborted: AtomicBool,
    close_wake: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    abort_wake: Mutex<Option<Sender<()>>>,
    abort_rx: Receiver<()>,
    /// Held shared by senders and exclusively by end-of-stream, so no item lands after close.
    send_gate: RwLock<()>,
}

impl<T> MemoryQueue<T> {
    /// `None` capacity means unbounded (sequential mode never blocks on send).
    pub fn new(capacity: Option<usize>) -> Self {
        let (data_tx, data_rx) = match capacity {
            Some(cap) => bounded(cap.max(1)),
            None => unbounded(),
        };
        let (close_tx, close_rx) = bounded::<()>(0);
        let (abort_tx, abort_rx) = bounded::<()>(0);
        Self {
            data_tx,
            data_rx,
            closed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            close_wake: Mutex::new(Some(close_tx)),
            close_rx,
            abort_wake: Mutex::new(Some(abort_tx)),
            abort_rx,
            send_gate: RwLock::new(()),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn wake(slot: &Mutex<Option<Sender<()>>>) {
        let sender = match slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);
    }

    fn pop_ready(&self) -> Option<Received<T>> {
        if self.is_aborted() {
            return Some(Received::Aborted);
        }
        if let Ok(item) = self.data_rx.try_recv() {
            return Some(Received::Item(item));
        }
        // Closed is only set under the write gate, so once seen the buffer can only shrink.
        if self.is_closed() {
            return Some(match self.data_rx.try_recv() {
                Ok(item) => Received::Item(item),
                Err(_) => Received::EndOfStream,
            });
        }
        None
    }
}

impl<T: Send> QueueWriter<T> for MemoryQueue<T> {
    fn send(&self, item: T) -> Result<(), QueueError> {
        let _gate = self.send_gate.read().unwrap_or_else(|p| p.into_inner());
        if self.is_closed() || self.is_aborted() {
            return Err(QueueError::Closed);
        }
        select! {
            send(self.data_tx, item) -> res => res.map_err(|_| QueueError::Closed),
            recv(self.abort_rx) -> _ => Err(QueueError::Closed),
        }
    }

    fn signal_end_of_stream(&self) {
        if self.is_aborted() {
            // A sender may still hold the gate while being released by the abort.
            if !self.closed.swap(true, Ordering::AcqRel) {
                Self::wake(&self.close_wake);
            }
            return;
        }
        let _gate = self.send_gate.write().unwrap_or_else(|p| p.into_inner());
        if !self.closed.swap(true, Ordering::AcqRel) {
            Self::wake(&self.close_wake);
        }
    }

    fn signal_abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            Self::wake(&self.abort_wake);
        }
    }
}

impl<T: Send> QueueReader<T> for MemoryQueue<T> {
    fn receive(&self) -> Received<T> {
        loop {
            if let Some(ready) = self.pop_ready() {
                return ready;
            }
            select! {
                recv(self.data_rx) -> msg => {
                    if let Ok(item) = msg {
                        if self.is_aborted() {
                            return Received::Aborted;
                        }
                        return Received::Item(item);
                    }
                }
                recv(self.abort_rx) -> _ => {}
                recv(self.close_rx) -> _ => {}
            }
        }
    }

    fn try_receive(&self) -> Option<Received<T>> {
        self.pop_ready()
    }

    fn signal_abort(&self) {
        QueueWriter::signal_abort(self);
    }
}
