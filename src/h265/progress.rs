//! Per-frame CTB-row progress counters for WPP/tile worker coordination.
//!
//! A row's decode can't start until the row above has progressed far enough
//! that its CABAC state and reconstructed samples (for intra/MV prediction)
//! are available. This mirrors the `ff_thread_await/report_progress` pair in
//! FFmpeg's frame-threading, implemented here with a condvar since the core
//! doesn't own a thread pool of its own (spec §9: host supplies workers).

use std::sync::{Condvar, Mutex};

/// Tracks how many CTB rows of a single frame have completed, plus a sticky
/// cancellation flag so in-flight waiters wake up on shutdown.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<State>,
    condvar: Condvar,
}

#[derive(Debug)]
struct State {
    rows_done: i32,
    cancelled: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                rows_done: -1,
                cancelled: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until at least `row` CTB rows have been reported done, or
    /// until cancellation. Returns `false` if woken by cancellation.
    pub fn await_progress(&self, row: i32) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.rows_done < row && !state.cancelled {
            state = self.condvar.wait(state).unwrap();
        }
        !state.cancelled
    }

    pub fn report_progress(&self, row: i32) {
        let mut state = self.state.lock().unwrap();
        if row > state.rows_done {
            state.rows_done = row;
            self.condvar.notify_all();
        }
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancelled = true;
        self.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap().cancelled
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn await_returns_once_row_reported() {
        let tracker = Arc::new(ProgressTracker::new());
        let t2 = tracker.clone();
        let handle = thread::spawn(move || {
            t2.report_progress(0);
            t2.report_progress(1);
        });
        assert!(tracker.await_progress(1));
        handle.join().unwrap();
    }

    #[test]
    fn cancellation_wakes_waiters() {
        let tracker = Arc::new(ProgressTracker::new());
        let t2 = tracker.clone();
        let handle = thread::spawn(move || {
            t2.cancel();
        });
        handle.join().unwrap();
        assert!(!tracker.await_progress(5));
    }
}
