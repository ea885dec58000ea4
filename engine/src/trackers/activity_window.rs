//! Activity window tracker.
//!
//! Once started, the tracker collects every message from its source and
//! decides when the burst of activity is over:
//!
//! ```text
//!             start_tracking()
//!   Idle/Closed ───────────────► Open ──── idle timer, no open keys ───► Closed
//!                                 │  ▲
//!        idle timer, keys open    │  │ blocking start
//!                                 ▼  │
//!                               Draining ── drain timer ──────────────► Closed
//!
//!   Open/Draining ── blocking end empties the open keys ──────────────► Closed
//! ```
//!
//! The idle timer is short and is restarted by every message except a
//! blocking end while the window is open. The drain timer is a ceiling: it
//! starts the first time the window enters draining and is never restarted
//! within that window, so outstanding operations cannot keep it open forever.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, info, trace};

use crate::reactive::{Observable, Subscription};
use crate::scheduler::{Scheduler, Timer};

/// Default inactivity timeout.
pub const DEFAULT_INACTIVITY: Duration = Duration::from_millis(100);

/// Default drain ceiling.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Extracts a blocking key from a message, if it has one.
pub type KeyClassifier<M> = Rc<dyn Fn(&M) -> Option<String>>;

/// Tracker timeouts and classifiers.
pub struct TrackerOptions<M> {
    pub inactivity: Duration,
    pub drain_timeout: Duration,
    pub is_blocking_start: KeyClassifier<M>,
    pub is_blocking_end: KeyClassifier<M>,
}

impl<M: 'static> Default for TrackerOptions<M> {
    /// Default timeouts; no message is ever blocking.
    fn default() -> Self {
        Self {
            inactivity: DEFAULT_INACTIVITY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            is_blocking_start: Rc::new(|_: &M| None),
            is_blocking_end: Rc::new(|_: &M| None),
        }
    }
}

impl<M> Clone for TrackerOptions<M> {
    fn clone(&self) -> Self {
        Self {
            inactivity: self.inactivity,
            drain_timeout: self.drain_timeout,
            is_blocking_start: Rc::clone(&self.is_blocking_start),
            is_blocking_end: Rc::clone(&self.is_blocking_end),
        }
    }
}

impl<M> fmt::Debug for TrackerOptions<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerOptions")
            .field("inactivity", &self.inactivity)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

/// Notification emitted by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum TrackingNotification<M> {
    TrackingStarted,
    TrackingEnded {
        events: Vec<M>,
        #[serde(serialize_with = "serialize_millis")]
        duration: Duration,
    },
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Where a tracker is in its window lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    /// Never started.
    Idle,
    Open,
    Draining,
    /// The last window closed; tracking may start again.
    Closed,
}

impl WindowPhase {
    fn is_tracking(self) -> bool {
        matches!(self, Self::Open | Self::Draining)
    }
}

/// Why a window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The idle timer fired with nothing outstanding.
    Inactivity,
    /// The last outstanding operation ended.
    OperationsSettled,
    /// The drain ceiling fired with operations still outstanding.
    DrainTimeout,
    /// `stop_tracking` was called.
    Stopped,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactivity => "inactivity",
            Self::OperationsSettled => "operations_settled",
            Self::DrainTimeout => "drain_timeout",
            Self::Stopped => "stopped",
        }
    }
}

struct Window<M> {
    phase: WindowPhase,
    started_at: Duration,
    last_event_at: Option<Duration>,
    events: Vec<M>,
    open_keys: HashSet<String>,
}

impl<M> Window<M> {
    fn idle() -> Self {
        Self {
            phase: WindowPhase::Idle,
            started_at: Duration::ZERO,
            last_event_at: None,
            events: Vec::new(),
            open_keys: HashSet::new(),
        }
    }
}

struct TrackerInner<M> {
    this: Weak<TrackerInner<M>>,
    options: TrackerOptions<M>,
    scheduler: Rc<dyn Scheduler>,
    source: Observable<M>,
    notifications: Observable<TrackingNotification<M>>,
    window: RefCell<Window<M>>,
    idle_timer: Timer,
    drain_timer: Timer,
    subscription: RefCell<Option<Subscription>>,
}

impl<M: Clone + 'static> TrackerInner<M> {
    fn start(&self) {
        {
            let mut window = self.window.borrow_mut();
            if window.phase.is_tracking() {
                debug!("start_tracking ignored: window already open");
                return;
            }
            *window = Window {
                phase: WindowPhase::Open,
                started_at: self.scheduler.now(),
                ..Window::idle()
            };
        }

        let this = self.this.clone();
        let subscription = self.source.subscribe(move |message: &M| {
            if let Some(inner) = this.upgrade() {
                inner.on_message(message);
            }
        });
        if let Some(stale) = self.subscription.borrow_mut().replace(subscription) {
            stale.unsubscribe();
        }

        self.arm_idle();
        debug!(inactivity_ms = self.options.inactivity.as_millis() as u64, "Activity window opened");
        self.notifications.notify(&TrackingNotification::TrackingStarted);
    }

    fn on_message(&self, message: &M) {
        let start_key = (self.options.is_blocking_start)(message);
        let end_key = if start_key.is_none() {
            (self.options.is_blocking_end)(message)
        } else {
            None
        };

        let (settled, rearm) = {
            let mut window = self.window.borrow_mut();
            if !window.phase.is_tracking() {
                return;
            }

            window.events.push(message.clone());
            window.last_event_at = Some(self.scheduler.now());

            if let Some(key) = start_key {
                trace!(key = %key, "Blocking operation started");
                window.open_keys.insert(key);
                if window.phase == WindowPhase::Draining {
                    debug!("Blocking operation started while draining, window reopened");
                    window.phase = WindowPhase::Open;
                }
                (false, true)
            } else if let Some(key) = end_key {
                let removed = window.open_keys.remove(&key);
                trace!(key = %key, known = removed, "Blocking operation ended");
                (removed && window.open_keys.is_empty(), false)
            } else {
                (false, window.phase == WindowPhase::Open)
            }
        };

        if settled {
            self.close(CloseReason::OperationsSettled);
        } else if rearm {
            self.arm_idle();
        }
    }

    fn arm_idle(&self) {
        let this = self.this.clone();
        self.idle_timer.arm(self.options.inactivity, move || {
            if let Some(inner) = this.upgrade() {
                inner.on_idle();
            }
        });
    }

    fn on_idle(&self) {
        let outstanding = {
            let mut window = self.window.borrow_mut();
            if window.phase != WindowPhase::Open {
                return;
            }
            if window.open_keys.is_empty() {
                None
            } else {
                window.phase = WindowPhase::Draining;
                Some(window.open_keys.len())
            }
        };

        let Some(outstanding) = outstanding else {
            self.close(CloseReason::Inactivity);
            return;
        };

        if self.drain_timer.is_armed() {
            debug!(outstanding, "Activity window draining again");
            return;
        }

        debug!(
            outstanding,
            drain_timeout_ms = self.options.drain_timeout.as_millis() as u64,
            "Activity window draining"
        );
        let this = self.this.clone();
        self.drain_timer.arm(self.options.drain_timeout, move || {
            if let Some(inner) = this.upgrade() {
                inner.close(CloseReason::DrainTimeout);
            }
        });
    }

    fn close(&self, reason: CloseReason) {
        let now = self.scheduler.now();
        let (events, duration, outstanding) = {
            let mut window = self.window.borrow_mut();
            if !window.phase.is_tracking() {
                return;
            }
            window.phase = WindowPhase::Closed;

            let outstanding = window.open_keys.len();
            let duration = if outstanding > 0 {
                now.saturating_sub(window.started_at)
            } else {
                window
                    .last_event_at
                    .map_or(Duration::ZERO, |at| at.saturating_sub(window.started_at))
            };
            window.open_keys.clear();
            (std::mem::take(&mut window.events), duration, outstanding)
        };

        self.detach();

        info!(
            reason = reason.as_str(),
            events = events.len(),
            outstanding,
            duration_ms = duration.as_millis() as u64,
            "Activity window closed"
        );
        self.notifications
            .notify(&TrackingNotification::TrackingEnded { events, duration });
    }

    fn detach(&self) {
        self.idle_timer.cancel();
        self.drain_timer.cancel();
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

/// Tracks one activity window at a time over a message source.
///
/// Messages are only observed between [`start_tracking`](Self::start_tracking)
/// and the window closing; the tracker is not subscribed to its source
/// otherwise. After a window closes the tracker can be started again.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::time::Duration;
/// use actwin_engine::reactive::Observable;
/// use actwin_engine::scheduler::ManualScheduler;
/// use actwin_engine::trackers::{ActivityWindowTracker, TrackerOptions, TrackingNotification};
///
/// let scheduler = Rc::new(ManualScheduler::new());
/// let source = Observable::<&'static str>::new();
/// let tracker = ActivityWindowTracker::new(&source, scheduler.clone(), TrackerOptions::default());
///
/// let ended = Rc::new(std::cell::RefCell::new(None));
/// let sink = Rc::clone(&ended);
/// tracker.notifications().subscribe(move |n: &TrackingNotification<&'static str>| {
///     if let TrackingNotification::TrackingEnded { events, .. } = n {
///         *sink.borrow_mut() = Some(events.clone());
///     }
/// });
///
/// tracker.start_tracking();
/// source.notify(&"mutation");
/// scheduler.advance(Duration::from_millis(100));
///
/// assert_eq!(*ended.borrow(), Some(vec!["mutation"]));
/// ```
pub struct ActivityWindowTracker<M> {
    inner: Rc<TrackerInner<M>>,
}

impl<M: Clone + 'static> ActivityWindowTracker<M> {
    /// Creates an idle tracker over `source`.
    pub fn new(source: &Observable<M>, scheduler: Rc<dyn Scheduler>, options: TrackerOptions<M>) -> Self {
        let inner = Rc::new_cyclic(|this| TrackerInner {
            this: this.clone(),
            idle_timer: Timer::new("activity-idle", Rc::clone(&scheduler)),
            drain_timer: Timer::new("activity-drain", Rc::clone(&scheduler)),
            options,
            scheduler,
            source: source.clone(),
            notifications: Observable::new(),
            window: RefCell::new(Window::idle()),
            subscription: RefCell::new(None),
        });
        Self { inner }
    }

    /// `tracking-started` / `tracking-ended` notifications.
    #[must_use]
    pub fn notifications(&self) -> &Observable<TrackingNotification<M>> {
        &self.inner.notifications
    }

    /// Opens a window. A no-op while a window is already open.
    ///
    /// The tracker subscribes to its source for the duration of each window.
    /// A derived source (such as a merged stream) disconnects from its inputs
    /// when its last subscriber leaves, so restarting a tracker over one
    /// observes nothing; create a tracker per window in that case.
    pub fn start_tracking(&self) {
        self.inner.start();
    }

    /// Closes the current window immediately.
    ///
    /// When no window is open this still emits a `tracking-ended` with no
    /// events and zero duration.
    pub fn stop_tracking(&self) {
        if self.is_tracking() {
            self.inner.close(CloseReason::Stopped);
        } else {
            debug!("stop_tracking called with no open window");
            self.inner.notifications.notify(&TrackingNotification::TrackingEnded {
                events: Vec::new(),
                duration: Duration::ZERO,
            });
        }
    }

    #[must_use]
    pub fn phase(&self) -> WindowPhase {
        self.inner.window.borrow().phase
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.phase().is_tracking()
    }

    /// Number of blocking operations started and not yet ended in this window.
    #[must_use]
    pub fn open_operations(&self) -> usize {
        self.inner.window.borrow().open_keys.len()
    }

    /// Number of messages collected in the current window.
    #[must_use]
    pub fn collected(&self) -> usize {
        self.inner.window.borrow().events.len()
    }
}

impl<M> Drop for ActivityWindowTracker<M> {
    fn drop(&mut self) {
        self.inner.idle_timer.cancel();
        self.inner.drain_timer.cancel();
        if let Some(subscription) = self.inner.subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
    }
}

impl<M> fmt::Debug for ActivityWindowTracker<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = self.inner.window.borrow();
        f.debug_struct("ActivityWindowTracker")
            .field("phase", &window.phase)
            .field("events", &window.events.len())
            .field("open_keys", &window.open_keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    enum Msg {
        Start(&'static str),
        End(&'static str),
        Tick,
    }

    type Ended = Rc<RefCell<Vec<(Vec<Msg>, Duration)>>>;

    struct Harness {
        scheduler: Rc<ManualScheduler>,
        source: Observable<Msg>,
        tracker: ActivityWindowTracker<Msg>,
        started: Rc<RefCell<usize>>,
        ended: Ended,
    }

    fn harness(inactivity_ms: u64, drain_ms: u64) -> Harness {
        let scheduler = Rc::new(ManualScheduler::new());
        let source = Observable::new();
        let options = TrackerOptions {
            inactivity: Duration::from_millis(inactivity_ms),
            drain_timeout: Duration::from_millis(drain_ms),
            is_blocking_start: Rc::new(|msg: &Msg| match msg {
                Msg::Start(key) => Some((*key).to_string()),
                _ => None,
            }),
            is_blocking_end: Rc::new(|msg: &Msg| match msg {
                Msg::End(key) => Some((*key).to_string()),
                _ => None,
            }),
        };
        let tracker = ActivityWindowTracker::new(&source, scheduler.clone(), options);

        let started = Rc::new(RefCell::new(0));
        let ended: Ended = Rc::new(RefCell::new(Vec::new()));
        let started_sink = Rc::clone(&started);
        let ended_sink = Rc::clone(&ended);
        tracker
            .notifications()
            .subscribe(move |notification: &TrackingNotification<Msg>| match notification {
                TrackingNotification::TrackingStarted => *started_sink.borrow_mut() += 1,
                TrackingNotification::TrackingEnded { events, duration } => {
                    ended_sink.borrow_mut().push((events.clone(), *duration));
                }
            });

        Harness {
            scheduler,
            source,
            tracker,
            started,
            ended,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_idle_close_with_no_events() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        assert_eq!(*h.started.borrow(), 1);
        assert_eq!(h.tracker.phase(), WindowPhase::Open);

        h.scheduler.advance(ms(9));
        assert!(h.ended.borrow().is_empty());

        h.scheduler.advance(ms(1));
        assert_eq!(*h.ended.borrow(), vec![(vec![], Duration::ZERO)]);
        assert_eq!(h.tracker.phase(), WindowPhase::Closed);
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_duration_spans_first_to_last_event() {
        let h = harness(10, 100);
        h.tracker.start_tracking();

        h.scheduler.advance(ms(2));
        h.source.notify(&Msg::Tick);
        h.scheduler.advance(ms(5));
        h.source.notify(&Msg::Tick);
        h.scheduler.advance(ms(10));

        assert_eq!(*h.ended.borrow(), vec![(vec![Msg::Tick, Msg::Tick], ms(7))]);
    }

    #[test]
    fn test_each_message_restarts_idle_timer() {
        let h = harness(10, 100);
        h.tracker.start_tracking();

        h.scheduler.advance(ms(8));
        h.source.notify(&Msg::Tick);
        h.scheduler.advance(ms(8));
        assert!(h.ended.borrow().is_empty(), "idle timer should have been restarted");

        h.scheduler.advance(ms(2));
        assert_eq!(h.ended.borrow().len(), 1);
        assert_eq!(h.scheduler.now(), ms(18));
    }

    #[test]
    fn test_drain_timeout_force_closes_with_open_operation() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("k"));

        h.scheduler.advance(ms(10));
        assert_eq!(h.tracker.phase(), WindowPhase::Draining);
        assert_eq!(h.tracker.open_operations(), 1);

        h.scheduler.advance(ms(99));
        assert!(h.ended.borrow().is_empty());

        h.scheduler.advance(ms(1));
        let ended = h.ended.borrow();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, vec![Msg::Start("k")]);
        assert_eq!(ended[0].1, ms(110), "forced close measures up to now");
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_matching_end_closes_draining_window_early() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("k"));
        h.scheduler.advance(ms(10));
        assert_eq!(h.tracker.phase(), WindowPhase::Draining);

        h.scheduler.advance(ms(40));
        h.source.notify(&Msg::End("k"));

        let ended = h.ended.borrow();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, vec![Msg::Start("k"), Msg::End("k")]);
        assert_eq!(ended[0].1, ms(50));
        assert!(h.scheduler.now() < ms(110));
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_matching_end_closes_open_window_early() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("a"));
        h.source.notify(&Msg::Start("b"));
        h.source.notify(&Msg::End("a"));
        assert!(h.tracker.is_tracking());

        h.source.notify(&Msg::End("b"));
        assert_eq!(h.ended.borrow().len(), 1);
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_unknown_end_is_collected_without_closing() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::End("ghost"));

        assert!(h.tracker.is_tracking());
        assert_eq!(h.tracker.collected(), 1);

        h.scheduler.advance(ms(10));
        assert_eq!(h.ended.borrow()[0].0, vec![Msg::End("ghost")]);
    }

    #[test]
    fn test_ordinary_message_while_draining_does_not_extend() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("k"));
        h.scheduler.advance(ms(10));

        h.scheduler.advance(ms(50));
        h.source.notify(&Msg::Tick);
        assert_eq!(h.tracker.phase(), WindowPhase::Draining);

        h.scheduler.advance(ms(50));
        let ended = h.ended.borrow();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, vec![Msg::Start("k"), Msg::Tick]);
    }

    #[test]
    fn test_new_operation_while_draining_reopens_without_resetting_ceiling() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("a"));
        h.scheduler.advance(ms(10));
        assert_eq!(h.tracker.phase(), WindowPhase::Draining);

        h.scheduler.advance(ms(20));
        h.source.notify(&Msg::Start("b"));
        assert_eq!(h.tracker.phase(), WindowPhase::Open);

        h.scheduler.advance(ms(10));
        assert_eq!(h.tracker.phase(), WindowPhase::Draining);

        h.scheduler.advance_to(ms(109));
        assert!(h.ended.borrow().is_empty());
        h.scheduler.advance(ms(1));
        assert_eq!(h.ended.borrow().len(), 1, "ceiling runs from the first drain");
    }

    #[test]
    fn test_start_tracking_twice_is_noop() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Tick);
        h.tracker.start_tracking();

        assert_eq!(*h.started.borrow(), 1);
        assert_eq!(h.tracker.collected(), 1);
        assert_eq!(h.source.subscriber_count(), 1);
    }

    #[test]
    fn test_stop_tracking_without_window_emits_empty_end() {
        let h = harness(10, 100);
        h.tracker.stop_tracking();
        assert_eq!(*h.ended.borrow(), vec![(vec![], Duration::ZERO)]);
        assert_eq!(h.tracker.phase(), WindowPhase::Idle);
    }

    #[test]
    fn test_stop_tracking_closes_and_cancels_timers() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Start("k"));
        h.scheduler.advance(ms(10));

        h.tracker.stop_tracking();

        assert_eq!(h.ended.borrow().len(), 1);
        assert_eq!(h.scheduler.pending_timers(), 0);
        assert_eq!(h.source.subscriber_count(), 0);
        assert_eq!(h.tracker.open_operations(), 0);
    }

    #[test]
    fn test_messages_outside_window_are_ignored() {
        let h = harness(10, 100);
        h.source.notify(&Msg::Tick);
        assert_eq!(h.source.subscriber_count(), 0);

        h.tracker.start_tracking();
        h.scheduler.advance(ms(10));
        h.source.notify(&Msg::Tick);

        assert_eq!(h.ended.borrow()[0].0, vec![]);
        assert_eq!(h.tracker.collected(), 0);
    }

    #[test]
    fn test_restart_after_close_starts_fresh_window() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        h.source.notify(&Msg::Tick);
        h.scheduler.advance(ms(10));

        h.tracker.start_tracking();
        h.scheduler.advance(ms(3));
        h.source.notify(&Msg::Start("k"));
        h.source.notify(&Msg::End("k"));

        let ended = h.ended.borrow();
        assert_eq!(*h.started.borrow(), 2);
        assert_eq!(ended.len(), 2);
        assert_eq!(ended[1], (vec![Msg::Start("k"), Msg::End("k")], ms(3)));
    }

    #[test]
    fn test_restart_from_ended_notification() {
        let h = harness(10, 100);
        let tracker = Rc::new(h.tracker);
        let weak = Rc::downgrade(&tracker);
        let restarted = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&restarted);
        tracker
            .notifications()
            .subscribe(move |notification: &TrackingNotification<Msg>| {
                if matches!(notification, TrackingNotification::TrackingEnded { .. }) && !*flag.borrow() {
                    *flag.borrow_mut() = true;
                    if let Some(tracker) = weak.upgrade() {
                        tracker.start_tracking();
                    }
                }
            });

        tracker.start_tracking();
        h.scheduler.advance(ms(10));

        assert!(*restarted.borrow());
        assert!(tracker.is_tracking());
        assert_eq!(h.scheduler.pending_timers(), 1);
    }

    #[test]
    fn test_default_options_never_block() {
        let scheduler = Rc::new(ManualScheduler::new());
        let source = Observable::<Msg>::new();
        let tracker = ActivityWindowTracker::new(&source, scheduler.clone(), TrackerOptions::default());

        tracker.start_tracking();
        source.notify(&Msg::Start("k"));
        assert_eq!(tracker.open_operations(), 0);

        scheduler.advance(DEFAULT_INACTIVITY);
        assert_eq!(tracker.phase(), WindowPhase::Closed);
    }

    #[test]
    fn test_drop_detaches_from_source_and_scheduler() {
        let h = harness(10, 100);
        h.tracker.start_tracking();
        let Harness {
            scheduler,
            source,
            tracker,
            ..
        } = h;

        drop(tracker);

        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_notification_wire_shape() {
        let started = serde_json::to_value(TrackingNotification::<Msg>::TrackingStarted).unwrap();
        assert_eq!(started, serde_json::json!({ "message": "tracking-started" }));

        let ended = serde_json::to_value(TrackingNotification::TrackingEnded {
            events: vec![Msg::Tick],
            duration: ms(5),
        })
        .unwrap();
        assert_eq!(ended["message"], "tracking-ended");
        assert_eq!(ended["duration"], 5);
        assert_eq!(ended["events"].as_array().map(Vec::len), Some(1));
    }
}
