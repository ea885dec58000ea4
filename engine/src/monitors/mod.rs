//! Signal monitors: constructible services that turn host events into
//! [`Signal`]s on an [`Observable`].
//!
//! Each monitor owns its observable and is created, subscribed to and
//! disposed explicitly. Nothing here is process-global; two hosts with two
//! sets of monitors never see each other's signals.
//!
//! - [`HttpRequestMonitor`]: request start/end pairs (the blocking signals)
//! - [`DomMutationMonitor`]: DOM mutations
//! - [`PerformanceEntryMonitor`]: resource timing entries
//! - [`InteractionMonitor`]: user interactions that trigger actions

mod dom;
mod http;
mod interaction;
mod performance;

pub use dom::DomMutationMonitor;
pub use http::HttpRequestMonitor;
pub use interaction::InteractionMonitor;
pub use performance::PerformanceEntryMonitor;

use crate::config::Config;
use crate::reactive::{merge, Observable};
use crate::types::Signal;

/// The monitors whose signals count as activity for a user action.
#[derive(Debug, Default)]
pub struct SignalMonitors {
    pub http: HttpRequestMonitor,
    pub dom: DomMutationMonitor,
    pub performance: PerformanceEntryMonitor,
}

impl SignalMonitors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitors configured from `config` (ignored URLs).
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: HttpRequestMonitor::new(config.ignored_urls.clone()),
            dom: DomMutationMonitor::new(),
            performance: PerformanceEntryMonitor::new(),
        }
    }

    /// A fresh observable carrying every monitor's signals in emission order.
    ///
    /// The merged observable detaches from the monitors once its last
    /// subscriber unsubscribes, so each consumer should take its own.
    #[must_use]
    pub fn merged(&self) -> Observable<Signal> {
        merge([
            self.http.observable(),
            self.dom.observable(),
            self.performance.observable(),
        ])
    }

    pub fn dispose(&self) {
        self.http.dispose();
        self.dom.dispose();
        self.performance.dispose();
    }
}
