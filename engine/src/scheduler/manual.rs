//! Virtual-time scheduler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use super::{Scheduler, TimerId};

struct PendingTask {
    id: TimerId,
    deadline: Duration,
    task: Box<dyn FnOnce()>,
}

/// A scheduler whose clock only moves when told to.
///
/// Tasks due at the same instant run in scheduling order. Tasks scheduled by
/// a running task are eligible in the same [`advance`](Self::advance) call if
/// their deadline falls inside the advanced range.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use actwin_engine::scheduler::{ManualScheduler, Scheduler};
///
/// let scheduler = ManualScheduler::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&fired);
/// scheduler.schedule(Duration::from_millis(10), Box::new(move || flag.set(true)));
///
/// scheduler.advance(Duration::from_millis(10));
/// assert!(fired.get());
/// assert_eq!(scheduler.now(), Duration::from_millis(10));
/// ```
pub struct ManualScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    pending: RefCell<Vec<PendingTask>>,
}

impl ManualScheduler {
    /// Creates a scheduler at time zero with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            next_id: Cell::new(0),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Moves the clock forward by `by`, running every task that falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        self.run_due(Some(target));
        self.now.set(target);
    }

    /// Moves the clock forward to `at`. Times in the past are ignored.
    pub fn advance_to(&self, at: Duration) {
        let now = self.now.get();
        if at > now {
            self.advance(at - now);
        }
    }

    /// Runs pending tasks in deadline order, moving the clock as needed,
    /// until nothing is left. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        self.run_due(None)
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Deadline of the earliest pending task.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.borrow().iter().map(|task| task.deadline).min()
    }

    fn run_due(&self, limit: Option<Duration>) -> usize {
        let mut ran = 0;
        while let Some(next) = self.pop_next(limit) {
            if next.deadline > self.now.get() {
                self.now.set(next.deadline);
            }
            (next.task)();
            ran += 1;
        }
        ran
    }

    fn pop_next(&self, limit: Option<Duration>) -> Option<PendingTask> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, task)| limit.map_or(true, |limit| task.deadline <= limit))
            .min_by_key(|(_, task)| (task.deadline, task.id))
            .map(|(index, _)| index)?;
        Some(pending.remove(index))
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("pending", &self.pending_timers())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.pending.borrow_mut().push(PendingTask {
            id,
            deadline: self.now.get() + delay,
            task,
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        let removed: Vec<PendingTask> = {
            let mut pending = self.pending.borrow_mut();
            let (cancelled, kept): (Vec<PendingTask>, Vec<PendingTask>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|task| task.id == id);
            *pending = kept;
            cancelled
        };
        // Dropped outside the borrow: a task's captures may cancel other timers on drop.
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn log_task(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Box<dyn FnOnce()> {
        let log = Rc::clone(log);
        Box::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn test_tasks_run_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.schedule(Duration::from_millis(30), log_task(&log, "c"));
        scheduler.schedule(Duration::from_millis(10), log_task(&log, "a"));
        scheduler.schedule(Duration::from_millis(20), log_task(&log, "b"));

        scheduler.advance(Duration::from_millis(30));

        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_same_deadline_runs_in_schedule_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.schedule(Duration::from_millis(5), log_task(&log, "first"));
        scheduler.schedule(Duration::from_millis(5), log_task(&log, "second"));

        scheduler.advance(Duration::from_millis(5));

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_clock_reports_task_deadline_while_running() {
        let scheduler = Rc::new(ManualScheduler::new());
        let observed = Rc::new(Cell::new(Duration::ZERO));

        let clock = Rc::clone(&scheduler);
        let sink = Rc::clone(&observed);
        scheduler.schedule(
            Duration::from_millis(7),
            Box::new(move || sink.set(clock.now())),
        );

        scheduler.advance(Duration::from_millis(50));

        assert_eq!(observed.get(), Duration::from_millis(7));
        assert_eq!(scheduler.now(), Duration::from_millis(50));
    }

    #[test]
    fn test_task_scheduled_during_advance_runs_if_due() {
        let scheduler = Rc::new(ManualScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_scheduler = Rc::clone(&scheduler);
        let inner_log = Rc::clone(&log);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_log.borrow_mut().push("outer");
                inner_scheduler.schedule(Duration::from_millis(5), log_task(&inner_log, "inner"));
            }),
        );

        scheduler.advance(Duration::from_millis(15));

        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_cancel_removes_task() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let id = scheduler.schedule(Duration::from_millis(10), log_task(&log, "cancelled"));
        scheduler.schedule(Duration::from_millis(10), log_task(&log, "kept"));
        scheduler.cancel(id);
        scheduler.cancel(id);

        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_advance_to_ignores_past() {
        let scheduler = ManualScheduler::new();
        scheduler.advance_to(Duration::from_millis(20));
        scheduler.advance_to(Duration::from_millis(10));
        assert_eq!(scheduler.now(), Duration::from_millis(20));
    }

    #[test]
    fn test_run_until_idle_moves_clock_to_last_deadline() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.schedule(Duration::from_secs(10), log_task(&log, "late"));

        assert_eq!(scheduler.next_deadline(), Some(Duration::from_secs(10)));
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(scheduler.now(), Duration::from_secs(10));
        assert_eq!(scheduler.next_deadline(), None);
    }
}
