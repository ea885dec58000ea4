//! DOM mutation monitor.

use tracing::debug;

use crate::reactive::Observable;
use crate::types::Signal;

/// Emits a `dom_mutation` signal for every mutation batch the host observes.
#[derive(Debug, Default)]
pub struct DomMutationMonitor {
    observable: Observable<Signal>,
}

impl DomMutationMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<Signal> {
        &self.observable
    }

    /// Reports one mutation, optionally naming the mutated element.
    pub fn record(&self, target: Option<String>) {
        self.observable.notify(&Signal::DomMutation { target });
    }

    pub fn dispose(&self) {
        self.observable.clear();
        debug!("DOM mutation monitor disposed");
    }
}
