//! Host harness: drives monitors, user actions and controllers from a
//! scripted command stream.
//!
//! # Script format
//!
//! One JSON object per line. Blank lines and lines starting with `#` are
//! skipped. `atMs` is the virtual time of the step and must not decrease.
//!
//! ```text
//! {"atMs": 0,   "kind": "interaction", "name": "click", "target": "add-to-cart"}
//! {"atMs": 5,   "kind": "http_start", "url": "/api/cart", "method": "POST", "alias": "cart"}
//! {"atMs": 20,  "kind": "item", "item": {"kind": "log", "name": "cart updated"}}
//! {"atMs": 400, "kind": "http_end", "alias": "cart"}
//! ```
//!
//! Step kinds: `start_action`, `interaction`, `signal`, `http_start`,
//! `http_end`, `item`, `cancel_action`. In live mode the same objects are
//! read without `atMs` and applied as they arrive.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{
    BufferedUserAction, MemorySink, Severity, TelemetrySink, UserAction, UserActionOptions, UserActionState,
};
use crate::config::Config;
use crate::error::{ReplayError, Result};
use crate::monitors::{InteractionMonitor, SignalMonitors};
use crate::reactive::Subscription;
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::trackers::{
    ActivityWindowTracker, Resolution, TrackerOptions, TrackingNotification, UserActionController,
};
use crate::types::{request_end_key, request_start_key, ApiType, Signal, TelemetryItem};

fn default_method() -> String {
    "GET".to_string()
}

/// One host command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptCommand {
    /// Starts a user action through the API.
    StartAction {
        name: String,
        #[serde(default)]
        trigger: Option<String>,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        severity: Severity,
    },
    /// Reports a user interaction; tracked names start an action named
    /// after the target.
    Interaction {
        name: String,
        #[serde(default)]
        target: Option<String>,
    },
    /// Feeds a raw signal to the monitor that owns its type.
    Signal { signal: Signal },
    /// Starts an HTTP request; `alias` names it for the matching `http_end`.
    HttpStart {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default, rename = "apiType")]
        api_type: ApiType,
        alias: String,
    },
    /// Ends the request started under `alias`.
    HttpEnd { alias: String },
    /// Telemetry produced by the host pipeline.
    Item { item: TelemetryItem },
    /// Cancels the running action.
    CancelAction,
}

/// A timed script line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub command: ScriptCommand,
}

/// Signals observed during an action's activity window.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    /// Signal types in arrival order.
    pub signals: Vec<String>,
    pub duration_ms: u64,
}

/// How one action finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub action_id: String,
    pub name: String,
    pub trigger: String,
    pub state: UserActionState,
    pub resolution: Option<Resolution>,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub window: WindowSummary,
}

/// Result of running a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub outcomes: Vec<ActionOutcome>,
    /// Everything released to the telemetry sink, in order.
    pub items: Vec<TelemetryItem>,
}

struct ActiveAction {
    action: Rc<BufferedUserAction>,
    controller: Rc<UserActionController>,
    tracker: ActivityWindowTracker<Signal>,
    window: Rc<RefCell<Option<WindowSummary>>>,
    state_subscription: Subscription,
    started_at: Duration,
}

/// The application side of the engine: owns the monitors and at most one
/// running user action with its controller.
pub struct ActionHost {
    this: Weak<ActionHost>,
    config: Config,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn TelemetrySink>,
    monitors: SignalMonitors,
    interactions: InteractionMonitor,
    active: RefCell<Option<ActiveAction>>,
    outcomes: RefCell<Vec<ActionOutcome>>,
    aliases: RefCell<HashMap<String, String>>,
    trigger_subscription: RefCell<Option<Subscription>>,
}

impl ActionHost {
    pub fn new(config: Config, scheduler: Rc<dyn Scheduler>, sink: Rc<dyn TelemetrySink>) -> Rc<Self> {
        let host = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            monitors: SignalMonitors::from_config(&config),
            interactions: InteractionMonitor::new(config.interaction_events.clone()),
            config,
            scheduler,
            sink,
            active: RefCell::new(None),
            outcomes: RefCell::new(Vec::new()),
            aliases: RefCell::new(HashMap::new()),
            trigger_subscription: RefCell::new(None),
        });

        let this = Rc::downgrade(&host);
        let subscription = host.interactions.observable().subscribe(move |signal: &Signal| {
            let Signal::Interaction { name, target } = signal else {
                return;
            };
            if let Some(host) = this.upgrade() {
                let action_name = target.clone().unwrap_or_else(|| name.clone());
                host.start_action(UserActionOptions::new(action_name).trigger(name.clone()));
            }
        });
        *host.trigger_subscription.borrow_mut() = Some(subscription);

        host
    }

    #[must_use]
    pub fn monitors(&self) -> &SignalMonitors {
        &self.monitors
    }

    #[must_use]
    pub fn interactions(&self) -> &InteractionMonitor {
        &self.interactions
    }

    #[must_use]
    pub fn has_active_action(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Resolves once no action is running, checking every `poll`.
    ///
    /// Needs a tokio runtime with timers enabled.
    pub async fn wait_until_idle(&self, poll: Duration) {
        while self.has_active_action() {
            tokio::time::sleep(poll).await;
        }
    }

    /// Copies of the outcomes recorded so far.
    #[must_use]
    pub fn outcomes(&self) -> Vec<ActionOutcome> {
        self.outcomes.borrow().clone()
    }

    /// Starts a user action and a controller for it.
    ///
    /// Returns `None` if another action is still running.
    pub fn start_action(&self, options: UserActionOptions) -> Option<Rc<BufferedUserAction>> {
        if let Some(active) = self.active.borrow().as_ref() {
            warn!(
                running = %active.action.name(),
                requested = %options.name,
                "A user action is already running, ignoring start"
            );
            return None;
        }

        let action = BufferedUserAction::start(options, Rc::clone(&self.scheduler), Rc::clone(&self.sink));

        let this = self.this.clone();
        let state_subscription = action.state_changes().subscribe(move |state: &UserActionState| {
            if state.is_terminal() {
                if let Some(host) = this.upgrade() {
                    host.finish_active();
                }
            }
        });

        let tracker = ActivityWindowTracker::new(
            &self.monitors.merged(),
            Rc::clone(&self.scheduler),
            TrackerOptions::<Signal> {
                is_blocking_start: Rc::new(request_start_key),
                is_blocking_end: Rc::new(request_end_key),
                ..self.config.tracker_options()
            },
        );
        let window = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&window);
        tracker
            .notifications()
            .subscribe(move |notification: &TrackingNotification<Signal>| {
                if let TrackingNotification::TrackingEnded { events, duration } = notification {
                    *slot.borrow_mut() = Some(WindowSummary {
                        signals: events.iter().map(|signal| signal.type_name().to_string()).collect(),
                        duration_ms: duration.as_millis() as u64,
                    });
                }
            });
        tracker.start_tracking();

        let controller = Rc::new(UserActionController::attach(
            action.clone(),
            &self.monitors.merged(),
            Rc::clone(&self.scheduler),
            self.config.controller_options(),
        ));

        info!(action_id = %action.id(), name = %action.name(), trigger = %action.trigger(), "User action started");

        *self.active.borrow_mut() = Some(ActiveAction {
            action: Rc::clone(&action),
            controller,
            tracker,
            window,
            state_subscription,
            started_at: self.scheduler.now(),
        });

        Some(action)
    }

    /// Cancels the running action, if any.
    pub fn cancel_action(&self) {
        let controller = self
            .active
            .borrow()
            .as_ref()
            .map(|active| Rc::clone(&active.controller));

        match controller {
            Some(controller) => controller.cancel(),
            None => debug!("No user action to cancel"),
        }
    }

    /// Routes a telemetry item through the running action, or straight to
    /// the sink when there is none.
    pub fn add_item(&self, item: TelemetryItem) {
        let action = self
            .active
            .borrow()
            .as_ref()
            .map(|active| Rc::clone(&active.action));

        match action {
            Some(action) => {
                action.add_item(item);
            }
            None => self.sink.push(item),
        }
    }

    /// Applies one command at the current time.
    pub fn apply(&self, command: ScriptCommand) {
        match command {
            ScriptCommand::StartAction {
                name,
                trigger,
                attributes,
                severity,
            } => {
                let mut options = UserActionOptions::new(name).severity(severity);
                if let Some(trigger) = trigger {
                    options = options.trigger(trigger);
                }
                options.attributes = attributes;
                self.start_action(options);
            }
            ScriptCommand::Interaction { name, target } => {
                self.interactions.record(&name, target);
            }
            ScriptCommand::Signal { signal } => self.route_signal(signal),
            ScriptCommand::HttpStart {
                url,
                method,
                api_type,
                alias,
            } => {
                if let Some(request_id) = self.monitors.http.request_started(url, method, api_type) {
                    self.aliases.borrow_mut().insert(alias, request_id);
                }
            }
            ScriptCommand::HttpEnd { alias } => {
                let request_id = self.aliases.borrow_mut().remove(&alias);
                match request_id {
                    Some(request_id) => {
                        self.monitors.http.request_ended(&request_id);
                    }
                    None => warn!(alias = %alias, "http_end for an unknown or ignored request"),
                }
            }
            ScriptCommand::Item { item } => self.add_item(item),
            ScriptCommand::CancelAction => self.cancel_action(),
        }
    }

    fn route_signal(&self, signal: Signal) {
        match signal {
            Signal::HttpRequestStart { .. } | Signal::HttpRequestEnd { .. } => {
                self.monitors.http.observable().notify(&signal);
            }
            Signal::DomMutation { target } => self.monitors.dom.record(target),
            Signal::ResourceEntry { name, duration_ms } => {
                self.monitors.performance.record("resource", name, duration_ms);
            }
            Signal::Interaction { name, target } => {
                self.interactions.record(&name, target);
            }
        }
    }

    /// Records the outcome of the action that just reached a terminal state.
    fn finish_active(&self) {
        let Some(active) = self.active.borrow_mut().take() else {
            return;
        };
        active.state_subscription.unsubscribe();

        if active.tracker.is_tracking() {
            active.tracker.stop_tracking();
        }
        let window = active.window.borrow_mut().take().unwrap_or_default();

        let outcome = ActionOutcome {
            action_id: active.action.id().to_string(),
            name: active.action.name().to_string(),
            trigger: active.action.trigger().to_string(),
            state: active.action.state(),
            resolution: active.controller.resolution(),
            started_at_ms: active.started_at.as_millis() as u64,
            ended_at_ms: self.scheduler.now().as_millis() as u64,
            window,
        };

        info!(
            action_id = %outcome.action_id,
            state = %outcome.state,
            resolution = outcome.resolution.map_or("none", Resolution::as_str),
            signals = outcome.window.signals.len(),
            "User action finished"
        );
        self.outcomes.borrow_mut().push(outcome);
    }

    /// Cancels any running action and disposes every monitor.
    pub fn shutdown(&self) {
        self.cancel_action();
        if let Some(subscription) = self.trigger_subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
        self.monitors.dispose();
        self.interactions.dispose();
        debug!("Action host shut down");
    }
}

impl fmt::Debug for ActionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHost")
            .field("active", &self.has_active_action())
            .field("outcomes", &self.outcomes.borrow().len())
            .finish()
    }
}

/// Parses a timed script.
///
/// # Errors
///
/// Returns [`ReplayError::Parse`] for a malformed line and
/// [`ReplayError::OutOfOrder`] when `atMs` decreases.
pub fn parse_script(script: &str) -> std::result::Result<Vec<ScriptStep>, ReplayError> {
    let mut steps = Vec::new();
    let mut previous_ms = 0;

    for (index, line) in script.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let step: ScriptStep = serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse {
            line: line_number,
            source,
        })?;
        if step.at_ms < previous_ms {
            return Err(ReplayError::OutOfOrder {
                line: line_number,
                at_ms: step.at_ms,
                previous_ms,
            });
        }
        previous_ms = step.at_ms;
        steps.push(step);
    }

    Ok(steps)
}

/// Parses one untimed command (live mode).
///
/// # Errors
///
/// Returns the JSON error for a malformed line.
pub fn parse_command(line: &str) -> serde_json::Result<ScriptCommand> {
    serde_json::from_str(line)
}

/// Runs `script` in virtual time and returns what happened.
///
/// All timers left after the last step run to completion, so every action
/// in the report is resolved.
///
/// # Errors
///
/// Returns an error if the script does not parse.
pub fn replay_script(script: &str, config: &Config) -> Result<ReplayReport> {
    let steps = parse_script(script)?;

    let scheduler = Rc::new(ManualScheduler::new());
    let sink = Rc::new(MemorySink::new());
    let host = ActionHost::new(config.clone(), scheduler.clone(), sink.clone());

    for step in steps {
        scheduler.advance_to(Duration::from_millis(step.at_ms));
        debug!(at_ms = step.at_ms, command = ?step.command, "Applying step");
        host.apply(step.command);
    }
    let drained = scheduler.run_until_idle();
    debug!(timers = drained, "Script finished, timers drained");

    let outcomes = host.outcomes();
    host.shutdown();

    Ok(ReplayReport {
        outcomes,
        items: sink.take(),
    })
}
