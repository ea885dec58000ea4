//! User interaction monitor.

use tracing::{debug, trace};

use crate::reactive::Observable;
use crate::types::Signal;

/// Emits `interaction` signals for a configured set of event names.
///
/// Interactions are action triggers. They are not part of
/// [`SignalMonitors::merged`](super::SignalMonitors::merged), so an action
/// is never kept alive by further clicks.
#[derive(Debug)]
pub struct InteractionMonitor {
    observable: Observable<Signal>,
    event_names: Vec<String>,
}

impl InteractionMonitor {
    #[must_use]
    pub fn new(event_names: Vec<String>) -> Self {
        Self {
            observable: Observable::new(),
            event_names,
        }
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<Signal> {
        &self.observable
    }

    /// Whether `name` is one of the configured trigger events.
    #[must_use]
    pub fn is_tracked(&self, name: &str) -> bool {
        self.event_names.iter().any(|tracked| tracked == name)
    }

    /// Reports one interaction. Returns whether a signal was emitted.
    pub fn record(&self, name: &str, target: Option<String>) -> bool {
        if !self.is_tracked(name) {
            trace!(name, "Skipping untracked interaction");
            return false;
        }

        self.observable.notify(&Signal::Interaction {
            name: name.to_string(),
            target,
        });
        true
    }

    pub fn dispose(&self) {
        self.observable.clear();
        debug!("Interaction monitor disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_only_configured_names_are_forwarded() {
        let monitor = InteractionMonitor::new(vec!["click".to_string(), "keydown".to_string()]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        monitor
            .observable()
            .subscribe(move |signal: &Signal| sink.borrow_mut().push(signal.type_name()));

        assert!(monitor.record("click", Some("button#buy".to_string())));
        assert!(!monitor.record("mousemove", None));
        assert!(monitor.record("keydown", None));

        assert_eq!(*seen.borrow(), vec!["interaction", "interaction"]);
    }

    #[test]
    fn test_empty_name_list_tracks_nothing() {
        let monitor = InteractionMonitor::new(Vec::new());
        assert!(!monitor.record("click", None));
    }
}
