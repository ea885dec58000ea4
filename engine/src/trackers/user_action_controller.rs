//! User action controller.
//!
//! Watches the merged signal stream on behalf of one [`UserAction`] and
//! decides whether it ended (something happened) or was cancelled (nothing
//! did).
//!
//! # Lifecycle
//!
//! 1. On attach the follow-up timer is armed. Any signal other than a request
//!    end marks the action valid and restarts it. Request starts and ends are
//!    tracked by request id.
//! 2. When the follow-up timer fires:
//!    - requests still running: the action is halted and the halt timer armed;
//!    - otherwise the action is ended if it saw any signal, cancelled if not.
//! 3. While halted only ends of running requests get through. The last one
//!    ends the action; the halt timer ends it regardless.
//!
//! Every terminal path cancels both timers and drops the stream subscription
//! before calling into the action, so a panicking action cannot leave the
//! controller half torn down.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{UserAction, UserActionState};
use crate::reactive::{isolate, Observable, Subscription};
use crate::scheduler::{Scheduler, Timer};
use crate::types::{request_end_key, request_start_key, Signal};

/// Default follow-up timeout.
pub const DEFAULT_FOLLOW_UP: Duration = Duration::from_millis(100);

/// Default halt ceiling.
pub const DEFAULT_HALT_TIMEOUT: Duration = Duration::from_secs(10);

/// Controller timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Quiet period after the last signal before the action is decided.
    pub follow_up: Duration,
    /// Longest a halted action waits for its running requests.
    pub halt_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            follow_up: DEFAULT_FOLLOW_UP,
            halt_timeout: DEFAULT_HALT_TIMEOUT,
        }
    }
}

/// How a controlled action was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Signals were seen and the follow-up period passed quietly.
    Ended,
    /// The last running request finished while halted.
    OperationsCompleted,
    /// The halt ceiling fired with requests still running.
    HaltTimeout,
    /// No signal arrived within the follow-up period.
    NoActivity,
    /// [`UserActionController::cancel`] was called.
    Cancelled,
    /// The action reached a terminal state without the controller.
    External,
}

impl Resolution {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ended => "ended",
            Self::OperationsCompleted => "operations_completed",
            Self::HaltTimeout => "halt_timeout",
            Self::NoActivity => "no_activity",
            Self::Cancelled => "cancelled",
            Self::External => "external",
        }
    }
}

#[derive(Default)]
struct Tracking {
    running: HashSet<String>,
    is_valid: bool,
    halted: bool,
}

struct ControllerInner {
    this: Weak<ControllerInner>,
    action: Rc<dyn UserAction>,
    options: ControllerOptions,
    tracking: RefCell<Tracking>,
    resolution: Cell<Option<Resolution>>,
    follow_up_timer: Timer,
    halt_timer: Timer,
    subscription: RefCell<Option<Subscription>>,
}

impl ControllerInner {
    fn attach(&self, signals: &Observable<Signal>) {
        let action = Rc::clone(&self.action);
        let gate = self.this.clone();
        let handler = self.this.clone();

        let subscription = signals
            .take_while(move |_| action.state().is_active())
            .filter(move |signal| gate.upgrade().is_some_and(|inner| inner.accepts(signal)))
            .subscribe(move |signal| {
                if let Some(inner) = handler.upgrade() {
                    inner.on_signal(signal);
                }
            });
        *self.subscription.borrow_mut() = Some(subscription);

        self.schedule_follow_up();
    }

    /// While halted, only ends of running requests pass.
    fn accepts(&self, signal: &Signal) -> bool {
        let tracking = self.tracking.borrow();
        if !tracking.halted {
            return true;
        }
        request_end_key(signal).is_some_and(|key| tracking.running.contains(&key))
    }

    fn on_signal(&self, signal: &Signal) {
        if self.resolution.get().is_some() {
            return;
        }

        let settled = {
            let mut tracking = self.tracking.borrow_mut();
            if let Some(key) = request_start_key(signal) {
                tracking.running.insert(key);
            }

            if let Some(key) = request_end_key(signal) {
                tracking.running.remove(&key);
                tracking.halted && tracking.running.is_empty()
            } else {
                tracking.is_valid = true;
                false
            }
        };

        if settled {
            self.resolve(Resolution::OperationsCompleted);
        } else if !signal.is_request_end() {
            self.schedule_follow_up();
        }
    }

    fn schedule_follow_up(&self) {
        let this = self.this.clone();
        self.follow_up_timer.arm(self.options.follow_up, move || {
            if let Some(inner) = this.upgrade() {
                inner.on_follow_up();
            }
        });
    }

    fn on_follow_up(&self) {
        if self.resolution.get().is_some() {
            return;
        }
        if self.action.state().is_terminal() {
            self.resolve(Resolution::External);
            return;
        }

        let (running, is_valid) = {
            let tracking = self.tracking.borrow();
            (tracking.running.len(), tracking.is_valid)
        };

        if running > 0 {
            self.halt(running);
        } else if is_valid {
            self.resolve(Resolution::Ended);
        } else {
            self.resolve(Resolution::NoActivity);
        }
    }

    fn halt(&self, running: usize) {
        self.tracking.borrow_mut().halted = true;

        let this = self.this.clone();
        self.halt_timer.arm(self.options.halt_timeout, move || {
            if let Some(inner) = this.upgrade() {
                if inner.action.state().is_terminal() {
                    inner.resolve(Resolution::External);
                } else {
                    warn!(
                        running = inner.tracking.borrow().running.len(),
                        "Halt timeout reached, ending user action"
                    );
                    inner.resolve(Resolution::HaltTimeout);
                }
            }
        });

        info!(
            running,
            halt_timeout_ms = self.options.halt_timeout.as_millis() as u64,
            "User action halted"
        );
        let action = Rc::clone(&self.action);
        isolate("user action halt", move || action.halt());
    }

    /// Tears down, then drives the action to its terminal state.
    fn resolve(&self, resolution: Resolution) {
        if self.resolution.get().is_some() {
            return;
        }
        self.resolution.set(Some(resolution));
        self.detach();

        debug!(resolution = resolution.as_str(), "User action resolved");

        let action = Rc::clone(&self.action);
        match resolution {
            Resolution::Ended | Resolution::OperationsCompleted | Resolution::HaltTimeout => {
                isolate("user action end", move || action.end());
            }
            Resolution::NoActivity | Resolution::Cancelled => {
                isolate("user action cancel", move || action.cancel());
            }
            Resolution::External => {}
        }
    }

    fn detach(&self) {
        self.follow_up_timer.cancel();
        self.halt_timer.cancel();
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        *self.tracking.borrow_mut() = Tracking::default();
    }
}

/// Drives one [`UserAction`] from a signal stream.
pub struct UserActionController {
    inner: Rc<ControllerInner>,
}

impl UserActionController {
    /// Starts controlling `action`, which should be in the `Started` state.
    ///
    /// `signals` is usually [`SignalMonitors::merged`](crate::monitors::SignalMonitors::merged).
    pub fn attach(
        action: Rc<dyn UserAction>,
        signals: &Observable<Signal>,
        scheduler: Rc<dyn Scheduler>,
        options: ControllerOptions,
    ) -> Self {
        let inner = Rc::new_cyclic(|this| ControllerInner {
            this: this.clone(),
            action,
            options,
            tracking: RefCell::new(Tracking::default()),
            resolution: Cell::new(None),
            follow_up_timer: Timer::new("action-follow-up", Rc::clone(&scheduler)),
            halt_timer: Timer::new("action-halt", scheduler),
            subscription: RefCell::new(None),
        });

        if inner.action.state() == UserActionState::Started {
            inner.attach(signals);
        } else {
            debug!(state = %inner.action.state(), "Not controlling an action that is not started");
            inner.resolve(Resolution::External);
        }

        Self { inner }
    }

    /// Cancels the action now, unless it is already resolved.
    pub fn cancel(&self) {
        self.inner.resolve(Resolution::Cancelled);
    }

    /// How the action was resolved, once it has been.
    #[must_use]
    pub fn resolution(&self) -> Option<Resolution> {
        self.inner.resolution.get()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution().is_some()
    }

    /// Whether the controller halted the action and is waiting on requests.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.tracking.borrow().halted
    }

    /// Requests started and not yet ended since the action started.
    #[must_use]
    pub fn running_operations(&self) -> usize {
        self.inner.tracking.borrow().running.len()
    }
}

impl Drop for UserActionController {
    fn drop(&mut self) {
        if self.inner.resolution.get().is_none() {
            debug!("User action controller dropped before resolution");
        }
        self.inner.detach();
    }
}

impl fmt::Debug for UserActionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserActionController")
            .field("state", &self.inner.action.state())
            .field("resolution", &self.resolution())
            .field("running", &self.running_operations())
            .finish()
    }
}
