//! Progress counter for decoder invocations (CLI, verbose only).

use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a bar over `total` invocations.
pub fn create_progress_bar(total: usize, desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = total,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " inv"
    )))
}

/// Update progress bar if available.
/// Uses try_lock so a contended bar never blocks a worker. A skipped update is recovered by
/// [`flush_progress_remainder`], which moves the bar to the absolute count.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Count one finished invocation and move the bar every `chunk_size` of them.
pub fn report_progress_batched(pb: Option<&ProgressBar>, counter: &AtomicUsize, chunk_size: usize) {
    let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(pb) = pb
        && done.is_multiple_of(chunk_size)
    {
        update_progress_bar(pb, chunk_size);
    }
}

/// Final update to `done` finished invocations (partial batches and contended updates), then refresh.
pub fn flush_progress_remainder(pb: Option<&ProgressBar>, done: usize) {
    let Some(pb) = pb else {
        return;
    };
    if let Ok(mut bar) = pb.lock() {
        if bar.counter < done {
            let _ = bar.update_to(done);
        }
        let _ = bar.refresh();
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batched_counter_without_bar() {
        let counter = AtomicUsize::new(0);
        for _ in 0..5 {
            report_progress_batched(None, &counter, 2);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        flush_progress_remainder(None, 5);
    }

    #[test]
    fn test_flush_recovers_contended_updates() {
        let pb = create_progress_bar(10, "Decoding");
        let counter = AtomicUsize::new(0);
        {
            let _held = pb.lock().unwrap();
            for _ in 0..4 {
                report_progress_batched(Some(&pb), &counter, 2);
            }
        }
        for _ in 0..3 {
            report_progress_batched(Some(&pb), &counter, 2);
        }
        assert_eq!(pb.lock().unwrap().counter, 2);
        flush_progress_remainder(Some(&pb), counter.load(Ordering::Relaxed));
        assert_eq!(pb.lock().unwrap().counter, 7);
    }
}
