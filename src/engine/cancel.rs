//! Cancellation: a cloneable handle that aborts the channels of whatever run is active.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::pipeline::Abortable;

#[derive(Default)]
struct CancelShared {
    requested: AtomicBool,
    active: Mutex<Vec<Arc<dyn Abortable>>>,
}

/// Handed out by [`Engine::cancel_handle`](crate::engine::Engine::cancel_handle). Safe to call
/// from a signal handler thread.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelShared>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and abort every attached run. Idempotent.
    pub fn cancel(&self) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Cancellation requested");
        let active = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for target in active.iter() {
            target.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the engine can run again.
    pub fn reset(&self) {
        self.inner.requested.store(false, Ordering::SeqCst);
    }

    /// Attach a run's channels. Already cancelled means aborted at once.
    pub(crate) fn attach(&self, target: Arc<dyn Abortable>) -> Attached {
        {
            let mut active = self
                .inner
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            active.push(Arc::clone(&target));
        }
        if self.is_cancelled() {
            target.abort();
        }
        Attached {
            handle: self.clone(),
            target,
        }
    }
}

/// Detaches the target when dropped.
pub(crate) struct Attached {
    handle: CancelHandle,
    target: Arc<dyn Abortable>,
}

impl Drop for Attached {
    fn drop(&mut self) {
        let mut active = self
            .handle
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        active.retain(|t| !Arc::ptr_eq(t, &self.target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Abortable for Counter {
        fn abort(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancel_aborts_attached_once() {
        let handle = CancelHandle::new();
        let target = Arc::new(Counter::default());
        let _attached = handle.attach(target.clone());
        handle.cancel();
        handle.cancel();
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_attach_after_cancel_aborts_immediately() {
        let handle = CancelHandle::new();
        handle.cancel();
        let target = Arc::new(Counter::default());
        let _attached = handle.attach(target.clone());
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detached_target_is_not_aborted() {
        let handle = CancelHandle::new();
        let target = Arc::new(Counter::default());
        drop(handle.attach(target.clone()));
        handle.cancel();
        assert_eq!(target.0.load(Ordering::SeqCst), 0);
    }
}
