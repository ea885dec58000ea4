//! Single-threaded, timer-driven execution model.
//!
//! All tracker and controller state changes happen either inside an
//! [`Observable`](crate::reactive::Observable) notification or inside a timer
//! callback scheduled through a [`Scheduler`]. Both run on one thread, so the
//! two never interleave mid-callback; they only interleave by ordering.
//!
//! # Implementations
//!
//! - [`ManualScheduler`]: virtual clock advanced explicitly. Used by tests and
//!   by the replay harness, where scripted time must be deterministic.
//! - [`RuntimeScheduler`]: real (tokio) time. Timers are `spawn_local` tasks,
//!   so it must be used from inside a [`tokio::task::LocalSet`].
//!
//! Consumers never hold raw [`TimerId`]s; they go through [`Timer`], which
//! keeps at most one live timer per purpose.

mod manual;
mod runtime;
mod timer;

use std::time::Duration;

pub use manual::ManualScheduler;
pub use runtime::RuntimeScheduler;
pub use timer::Timer;

/// Handle identifying one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw numeric value (unique per scheduler instance).
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A clock plus one-shot delayed tasks.
pub trait Scheduler {
    /// Time elapsed since this scheduler was created.
    fn now(&self) -> Duration;

    /// Runs `task` once after `delay`, unless cancelled first.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId;

    /// Cancels a scheduled task. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: TimerId);
}
