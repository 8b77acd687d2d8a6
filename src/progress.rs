use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::event::{EngineEvent, EventBus, LongProcess};

/// Shared cancel flag for the engine's long-running loops.
///
/// Clones share the flag, so a token handed to another thread can stop an
/// operation the engine is running synchronously. A request made while the
/// engine is idle applies to the next long process.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a cancellable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled(T),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Completed(value) | Outcome::Cancelled(value) => value,
        }
    }
}

/// Progress and cancellation state of the running long process
#[derive(Debug)]
pub struct ProgressController {
    token: CancelToken,
    process: Option<LongProcess>,
    progress: f64,
    interval: u64,
    ticks: u64,
}

impl ProgressController {
    pub fn new(interval: usize) -> Self {
        Self {
            token: CancelToken::new(),
            process: None,
            progress: 0.0,
            interval: interval.max(1) as u64,
            ticks: 0,
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn in_long_process(&self) -> bool {
        self.process.is_some()
    }

    pub fn process(&self) -> Option<LongProcess> {
        self.process
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn begin(&mut self, process: LongProcess) {
        self.process = Some(process);
        self.progress = 0.0;
        self.ticks = 0;
    }

    /// Polled at every safe point of a loop.
    pub fn should_stop(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Record `done` of `total` units and publish it every `interval` steps.
    pub fn step(&mut self, events: &mut EventBus, done: u64, total: u64) {
        self.ticks += 1;
        self.progress = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        if self.ticks % self.interval == 0 || done >= total {
            if let Some(process) = self.process {
                events.emit(EngineEvent::Progress {
                    process,
                    fraction: self.progress,
                });
            }
        }
    }

    /// Leave the long process and clear any pending cancel request.
    pub fn finish(&mut self) {
        self.process = None;
        self.ticks = 0;
        self.token.reset();
    }

    pub fn reset(&mut self) {
        self.finish();
        self.progress = 0.0;
    }
}
