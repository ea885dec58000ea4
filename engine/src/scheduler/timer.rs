//! Owned, cancellable one-shot timer.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use super::{Scheduler, TimerId};

struct Slot {
    handle: Cell<Option<TimerId>>,
    /// Bumped on every arm/cancel; a callback from an older generation is stale.
    generation: Cell<u64>,
}

/// A timer with at most one pending callback.
///
/// [`arm`](Self::arm) always cancels the previous callback before scheduling
/// the new one, and dropping the timer cancels whatever is pending.
pub struct Timer {
    purpose: &'static str,
    scheduler: Rc<dyn Scheduler>,
    slot: Rc<Slot>,
}

impl Timer {
    /// Creates a disarmed timer. `purpose` only appears in logs.
    pub fn new(purpose: &'static str, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            purpose,
            scheduler,
            slot: Rc::new(Slot {
                handle: Cell::new(None),
                generation: Cell::new(0),
            }),
        }
    }

    /// Schedules `callback` after `delay`, replacing any pending callback.
    pub fn arm(&self, delay: Duration, callback: impl FnOnce() + 'static) {
        self.cancel();

        let generation = self.slot.generation.get();
        let slot = Rc::downgrade(&self.slot);
        let id = self.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(slot) = slot.upgrade() else {
                    return;
                };
                if slot.generation.get() != generation {
                    return;
                }
                slot.handle.set(None);
                callback();
            }),
        );
        self.slot.handle.set(Some(id));

        trace!(
            purpose = self.purpose,
            delay_ms = delay.as_millis() as u64,
            "Timer armed"
        );
    }

    /// Cancels the pending callback, if any.
    pub fn cancel(&self) {
        self.slot.generation.set(self.slot.generation.get() + 1);
        if let Some(id) = self.slot.handle.take() {
            self.scheduler.cancel(id);
            trace!(purpose = self.purpose, "Timer cancelled");
        }
    }

    /// Whether a callback is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.handle.get().is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("purpose", &self.purpose)
            .field("armed", &self.is_armed())
            .finish()
    }
}
