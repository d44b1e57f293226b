//! Stop flag shared by the background loops.
//!
//! Sampling and adjustment loops sleep on this signal instead of
//! `thread::sleep` so `stop()` returns without waiting out a full interval.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_stop(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.lock() = false;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for up to `timeout`, returning `true` once stop was requested.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.lock();
        while !*stopped {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            stopped = self
                .wake
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
