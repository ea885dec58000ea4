//! Actwin Engine - activity windows and user action coordination.
//!
//! This crate decides when a burst of application activity is over. It
//! watches a stream of signals (HTTP requests, DOM mutations, resource
//! timings) and uses two timers per decision: a short inactivity timer that
//! restarts on every signal, and a longer ceiling that bounds how long
//! outstanding operations may keep a window or an action alive.
//!
//! # Overview
//!
//! - An [`ActivityWindowTracker`] collects every message between
//!   `start_tracking` and the first quiet period, waiting for blocking
//!   operations (such as in-flight requests) to finish up to a drain
//!   ceiling.
//! - A [`UserActionController`] drives a [`UserAction`] from `Started` to
//!   `Ended` or `Cancelled`, halting it while requests are outstanding.
//!
//! Everything is single-threaded: observables, trackers and controllers are
//! `!Send` and timers come from a [`Scheduler`](scheduler::Scheduler).
//!
//! # Modules
//!
//! - [`reactive`]: Observable and subscription primitive with operators
//! - [`scheduler`]: Timer scheduling in virtual or tokio time
//! - [`types`]: Signals and telemetry items
//! - [`monitors`]: Per-source signal producers
//! - [`action`]: User action lifecycle and telemetry buffering
//! - [`trackers`]: Activity window tracker and user action controller
//! - [`replay`]: Host harness driven by scripted commands
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for engine operations

pub mod action;
pub mod config;
pub mod error;
pub mod monitors;
pub mod reactive;
pub mod replay;
pub mod scheduler;
pub mod trackers;
pub mod types;

pub use action::{
    BufferedUserAction, MemorySink, Severity, TelemetrySink, UserAction, UserActionOptions, UserActionState,
};
pub use config::{Config, ConfigError, LogFormat};
pub use error::{EngineError, ReplayError, Result};
pub use monitors::SignalMonitors;
pub use reactive::{merge, Observable, Subscription};
pub use replay::{replay_script, ActionHost, ActionOutcome, ReplayReport};
pub use scheduler::{ManualScheduler, RuntimeScheduler, Scheduler};
pub use trackers::{
    ActivityWindowTracker, ControllerOptions, Resolution, TrackerOptions, TrackingNotification, UserActionController,
};
pub use types::{Signal, TelemetryItem};
