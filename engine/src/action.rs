//! User actions: the host-side object a controller drives.
//!
//! A [`UserAction`] is created by the host when a trigger (a click, a
//! keypress, an API call) happens. The controller in
//! [`trackers::user_action_controller`](crate::trackers::user_action_controller)
//! then decides its fate through [`halt`](UserAction::halt),
//! [`end`](UserAction::end) and [`cancel`](UserAction::cancel).
//!
//! [`BufferedUserAction`] is the reference implementation: it holds telemetry
//! produced while the action is running and releases it on a terminal
//! transition, tagged with the action's correlation id when the action ended
//! and untagged when it was cancelled.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::reactive::{isolate, Observable};
use crate::scheduler::Scheduler;
use crate::types::{generate_short_id, ActionRef, ItemKind, TelemetryItem};

/// Name of the summary event pushed when an action ends.
pub const USER_ACTION_EVENT: &str = "user_action";

/// Trigger recorded for actions started through the API rather than by an
/// interaction.
pub const API_CALL_TRIGGER: &str = "api_call";

/// Lifecycle state of a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActionState {
    Started,
    Halted,
    Ended,
    Cancelled,
}

impl UserActionState {
    /// `Started` or `Halted`: the only states in which signals are observed.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Halted)
    }

    /// `Ended` or `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Halted => "halted",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UserActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface a controller uses to drive an action.
///
/// Implementations must make `end` and `cancel` no-ops once the action is
/// terminal, and `halt` a no-op outside `Started`.
pub trait UserAction {
    fn halt(&self);
    fn end(&self);
    fn cancel(&self);
    fn state(&self) -> UserActionState;
}

/// Receiver of telemetry released by actions.
pub trait TelemetrySink {
    fn push(&self, item: TelemetryItem);
}

impl<F> TelemetrySink for F
where
    F: Fn(TelemetryItem),
{
    fn push(&self, item: TelemetryItem) {
        self(item);
    }
}

/// Sink that keeps everything in memory, in push order.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: RefCell<Vec<TelemetryItem>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of everything pushed so far.
    #[must_use]
    pub fn items(&self) -> Vec<TelemetryItem> {
        self.items.borrow().clone()
    }

    /// Removes and returns everything pushed so far.
    pub fn take(&self) -> Vec<TelemetryItem> {
        std::mem::take(&mut *self.items.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl TelemetrySink for MemorySink {
    fn push(&self, item: TelemetryItem) {
        self.items.borrow_mut().push(item);
    }
}

/// How important an action is to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

/// Predicate deciding which items keep no action tag when an action ends.
pub type ExcludeItem = Rc<dyn Fn(&TelemetryItem) -> bool>;

/// Parameters for [`BufferedUserAction::start`].
#[derive(Clone)]
pub struct UserActionOptions {
    pub name: String,
    /// What started the action (e.g. `click`).
    pub trigger: String,
    /// Parent correlation id; defaults to the action's own id.
    pub parent_id: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub severity: Severity,
    /// Extra exclusion on top of the built-in web-vitals rule.
    pub exclude_item: Option<ExcludeItem>,
}

impl UserActionOptions {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: API_CALL_TRIGGER.to_string(),
            parent_id: None,
            attributes: BTreeMap::new(),
            severity: Severity::Normal,
            exclude_item: None,
        }
    }

    #[must_use]
    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn exclude_item(mut self, predicate: impl Fn(&TelemetryItem) -> bool + 'static) -> Self {
        self.exclude_item = Some(Rc::new(predicate));
        self
    }
}

impl fmt::Debug for UserActionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserActionOptions")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("parent_id", &self.parent_id)
            .field("attributes", &self.attributes)
            .field("severity", &self.severity)
            .field("exclude_item", &self.exclude_item.is_some())
            .finish()
    }
}

/// Reference user action that buffers telemetry while it runs.
///
/// Items added while the action is `Started` are held back. On
/// [`end`](UserAction::end) they are released tagged with
/// `action { parentId, name }` (unless excluded) followed by a
/// [`USER_ACTION_EVENT`] summary. On [`cancel`](UserAction::cancel) they are
/// released untagged and no summary is sent. Items added in any other state
/// go straight to the sink.
pub struct BufferedUserAction {
    id: String,
    parent_id: String,
    name: String,
    trigger: String,
    attributes: BTreeMap<String, String>,
    severity: Severity,
    exclude_item: Option<ExcludeItem>,
    start_time: DateTime<Utc>,
    started_at: Duration,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn TelemetrySink>,
    state: Cell<UserActionState>,
    state_changes: Observable<UserActionState>,
    buffer: RefCell<Vec<TelemetryItem>>,
}

impl BufferedUserAction {
    /// Creates an action in the `Started` state.
    ///
    /// Durations are measured on `scheduler`'s clock; the wall-clock start
    /// time only stamps the summary event.
    pub fn start(
        options: UserActionOptions,
        scheduler: Rc<dyn Scheduler>,
        sink: Rc<dyn TelemetrySink>,
    ) -> Rc<Self> {
        let id = generate_short_id();
        let parent_id = options.parent_id.unwrap_or_else(|| id.clone());

        debug!(action_id = %id, name = %options.name, trigger = %options.trigger, "User action started");

        Rc::new(Self {
            id,
            parent_id,
            name: options.name,
            trigger: options.trigger,
            attributes: options.attributes,
            severity: options.severity,
            exclude_item: options.exclude_item,
            start_time: Utc::now(),
            started_at: scheduler.now(),
            scheduler,
            sink,
            state: Cell::new(UserActionState::Started),
            state_changes: Observable::new(),
            buffer: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Notified with the new state after every transition.
    #[must_use]
    pub fn state_changes(&self) -> &Observable<UserActionState> {
        &self.state_changes
    }

    /// Number of items currently held back.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// Time elapsed on the scheduler clock since the action started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.scheduler.now().saturating_sub(self.started_at)
    }

    /// Buffers `item` while the action is `Started`; otherwise forwards it.
    ///
    /// Returns `true` if the item was buffered.
    pub fn add_item(&self, item: TelemetryItem) -> bool {
        if self.state.get() == UserActionState::Started {
            self.buffer.borrow_mut().push(item);
            true
        } else {
            self.deliver(item);
            false
        }
    }

    /// Pushes one item, containing a panicking sink so the rest of the
    /// release and the state change still happen.
    fn deliver(&self, item: TelemetryItem) -> bool {
        let sink = &self.sink;
        let delivered = isolate("telemetry sink", move || sink.push(item));
        if !delivered {
            warn!(action_id = %self.id, "Telemetry item dropped by sink");
        }
        delivered
    }

    fn is_excluded(&self, item: &TelemetryItem) -> bool {
        item.is_web_vitals() || self.exclude_item.as_ref().is_some_and(|exclude| exclude(item))
    }

    fn transition(&self, state: UserActionState) {
        self.state.set(state);
        self.state_changes.notify(&state);
    }

    fn summary_event(&self, duration: Duration) -> TelemetryItem {
        let start_ms = self.start_time.timestamp_millis();
        let duration_ms = duration.as_millis() as i64;

        let mut attributes = self.attributes.clone();
        attributes.insert("userActionStartTime".to_string(), start_ms.to_string());
        attributes.insert("userActionEndTime".to_string(), (start_ms + duration_ms).to_string());
        attributes.insert("userActionDuration".to_string(), duration_ms.to_string());
        attributes.insert("userActionTrigger".to_string(), self.trigger.clone());
        attributes.insert("userActionSeverity".to_string(), self.severity.as_str().to_string());
        attributes.insert("userActionName".to_string(), self.name.clone());

        TelemetryItem {
            kind: ItemKind::Event,
            name: USER_ACTION_EVENT.to_string(),
            timestamp: self.start_time,
            attributes,
            action: Some(ActionRef {
                parent_id: self.id.clone(),
                name: self.name.clone(),
            }),
        }
    }
}

impl UserAction for BufferedUserAction {
    fn halt(&self) {
        if self.state.get() != UserActionState::Started {
            return;
        }
        debug!(action_id = %self.id, buffered = self.buffered(), "User action halted");
        self.transition(UserActionState::Halted);
    }

    fn end(&self) {
        if self.state.get().is_terminal() {
            return;
        }

        let duration = self.elapsed();
        self.state.set(UserActionState::Ended);

        let items = std::mem::take(&mut *self.buffer.borrow_mut());
        let flushed = items.len();
        for mut item in items {
            if !self.is_excluded(&item) {
                item.action = Some(ActionRef {
                    parent_id: self.id.clone(),
                    name: self.name.clone(),
                });
            }
            self.deliver(item);
        }

        info!(
            action_id = %self.id,
            name = %self.name,
            duration_ms = duration.as_millis() as u64,
            flushed,
            "User action ended"
        );

        self.state_changes.notify(&UserActionState::Ended);
        self.deliver(self.summary_event(duration));
    }

    fn cancel(&self) {
        if self.state.get().is_terminal() {
            return;
        }

        self.state.set(UserActionState::Cancelled);
        let items = std::mem::take(&mut *self.buffer.borrow_mut());
        let released = items.len();
        for item in items {
            self.deliver(item);
        }

        info!(action_id = %self.id, name = %self.name, released, "User action cancelled");
        self.state_changes.notify(&UserActionState::Cancelled);
    }

    fn state(&self) -> UserActionState {
        self.state.get()
    }
}

impl fmt::Debug for BufferedUserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedUserAction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state.get())
            .field("buffered", &self.buffered())
            .finish()
    }
}
