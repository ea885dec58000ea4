//! Tokio-backed scheduler for real-time use.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

use super::{Scheduler, TimerId};

/// Scheduler driven by tokio's clock.
///
/// Each scheduled task is a `spawn_local` task that sleeps and then runs, so
/// the scheduler must live inside a [`tokio::task::LocalSet`]. Dropping the
/// scheduler aborts everything still pending.
pub struct RuntimeScheduler {
    origin: Instant,
    next_id: Cell<u64>,
    tasks: Rc<RefCell<HashMap<TimerId, AbortHandle>>>,
}

impl RuntimeScheduler {
    /// Creates a scheduler whose epoch is the current tokio instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            next_id: Cell::new(0),
            tasks: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Number of tasks that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl Default for RuntimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuntimeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeScheduler")
            .field("pending", &self.pending_timers())
            .finish()
    }
}

impl Scheduler for RuntimeScheduler {
    fn now(&self) -> Duration {
        Instant::now().saturating_duration_since(self.origin)
    }

    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let tasks = Rc::downgrade(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(tasks) = tasks.upgrade() {
                tasks.borrow_mut().remove(&id);
            }
            task();
        });
        self.tasks.borrow_mut().insert(id, handle.abort_handle());

        id
    }

    fn cancel(&self, id: TimerId) {
        let handle = self.tasks.borrow_mut().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            trace!(timer = id.get(), "Runtime timer aborted");
        }
    }
}

impl Drop for RuntimeScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.borrow_mut().drain() {
            handle.abort();
        }
    }
}
