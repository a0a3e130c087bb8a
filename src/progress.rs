use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::error::{ForensicsError, Result};

pub type ProgressCallback<'a> = &'a (dyn Fn(f64) + Sync);

/// Share of the bar reserved for the per-detector steps; aggregation and
/// report assembly fill the rest.
const WORK_SHARE: f64 = 0.95;

pub struct ProgressReporter<'a> {
    callback: ProgressCallback<'a>,
    total: usize,
    completed: AtomicUsize,
    last: Mutex<f64>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: ProgressCallback<'a>, total: usize) -> Self {
        Self {
            callback,
            total: total.max(1),
            completed: AtomicUsize::new(0),
            last: Mutex::new(0.0),
        }
    }

    pub fn start(&self) {
        self.deliver(0.0, true);
    }

    pub fn step(&self) {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let fraction = done.min(self.total) as f64 / self.total as f64 * WORK_SHARE;
        self.deliver(fraction, false);
    }

    pub fn finish(&self) {
        self.deliver(1.0, true);
    }

    fn deliver(&self, fraction: f64, wait: bool) {
        let guard = if wait { Some(self.last.lock()) } else { self.last.try_lock() };
        let Some(mut last) = guard else {
            return;
        };

        if fraction > *last || (fraction == 0.0 && *last == 0.0) {
            *last = fraction;
            (self.callback)(fraction);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ForensicsError::Cancelled);
        }
        Ok(())
    }
}
