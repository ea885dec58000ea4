//! Performance entry monitor.

use tracing::{debug, trace};

use crate::reactive::Observable;
use crate::types::Signal;

/// Entry type forwarded as a signal. Other entry types (navigation, paint,
/// long tasks) are reported elsewhere and do not count as action activity.
const RESOURCE_ENTRY_TYPE: &str = "resource";

/// Emits `resource_entry` signals for resource timing entries.
#[derive(Debug, Default)]
pub struct PerformanceEntryMonitor {
    observable: Observable<Signal>,
}

impl PerformanceEntryMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<Signal> {
        &self.observable
    }

    /// Reports one performance entry. Returns whether a signal was emitted.
    pub fn record(&self, entry_type: &str, name: impl Into<String>, duration_ms: f64) -> bool {
        if entry_type != RESOURCE_ENTRY_TYPE {
            trace!(entry_type, "Skipping non-resource performance entry");
            return false;
        }

        self.observable.notify(&Signal::ResourceEntry {
            name: name.into(),
            duration_ms,
        });
        true
    }

    pub fn dispose(&self) {
        self.observable.clear();
        debug!("Performance entry monitor disposed");
    }
}
