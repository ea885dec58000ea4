//! Decision logic built on the reactive primitive.
//!
//! - [`activity_window`]: generic activity window over any message stream
//! - [`user_action_controller`]: ends or cancels a user action from the
//!   signal stream

pub mod activity_window;
pub mod user_action_controller;

pub use activity_window::{
    ActivityWindowTracker, CloseReason, KeyClassifier, TrackerOptions, TrackingNotification, WindowPhase,
};
pub use user_action_controller::{ControllerOptions, Resolution, UserActionController};
