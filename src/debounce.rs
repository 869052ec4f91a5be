//! Cancellable quiet-period timer, driven by a caller-supplied clock

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    due: Instant,
}

/// Holds at most one pending value. Arming again before the deadline
/// replaces the value and restarts the quiet period, so only the last input
/// of a burst ever fires.
///
/// The debouncer never reads the clock itself: callers pass `now`, which
/// lets tests advance a virtual clock instead of sleeping.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Arm with `value`, cancelling any pending one. Returns true if a
    /// pending value was superseded.
    pub fn arm(&mut self, value: T, now: Instant) -> bool {
        let superseded = self.pending.is_some();
        self.pending = Some(Pending {
            value,
            due: now + self.quiet,
        });
        superseded
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Fire if the quiet period has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let due = self.deadline()?;
        if due <= now { self.cancel() } else { None }
    }

    /// Fire immediately, regardless of the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.cancel()
    }
}
