//! HTTP request lifecycle monitor.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::reactive::Observable;
use crate::types::{generate_short_id, ApiType, HttpRequest, Signal};

/// Emits `http_request_start` / `http_request_end` pairs.
///
/// The host instrumentation calls [`request_started`](Self::request_started)
/// when a request goes out and [`request_ended`](Self::request_ended) when it
/// completes, fails or is aborted. The monitor assigns the correlation id and
/// remembers the request payload so the end message mirrors the start.
#[derive(Debug)]
pub struct HttpRequestMonitor {
    observable: Observable<Signal>,
    ignored_urls: Vec<String>,
    in_flight: RefCell<HashMap<String, HttpRequest>>,
}

impl HttpRequestMonitor {
    /// Creates a monitor that skips any URL containing one of `ignored_urls`.
    #[must_use]
    pub fn new(ignored_urls: Vec<String>) -> Self {
        Self {
            observable: Observable::new(),
            ignored_urls,
            in_flight: RefCell::new(HashMap::new()),
        }
    }

    /// Stream of request start/end signals.
    #[must_use]
    pub fn observable(&self) -> &Observable<Signal> {
        &self.observable
    }

    /// Whether requests to `url` are skipped.
    #[must_use]
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignored_urls
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    /// Records an outgoing request and emits `http_request_start`.
    ///
    /// Returns the generated request id, or `None` if the URL is ignored (in
    /// which case nothing is emitted).
    pub fn request_started(
        &self,
        url: impl Into<String>,
        method: impl Into<String>,
        api_type: ApiType,
    ) -> Option<String> {
        let url = url.into();
        if self.is_ignored(&url) {
            debug!(url = %url, "Ignoring request to excluded URL");
            return None;
        }

        let request = HttpRequest {
            request_id: generate_short_id(),
            url,
            method: method.into(),
            api_type,
        };
        let request_id = request.request_id.clone();

        trace!(request_id = %request_id, url = %request.url, "Request started");
        self.in_flight
            .borrow_mut()
            .insert(request_id.clone(), request.clone());
        self.observable.notify(&Signal::HttpRequestStart { request });

        Some(request_id)
    }

    /// Emits `http_request_end` for a request previously started here.
    ///
    /// Returns `false` (and emits nothing) for unknown or already-ended ids.
    pub fn request_ended(&self, request_id: &str) -> bool {
        let Some(request) = self.in_flight.borrow_mut().remove(request_id) else {
            debug!(request_id = %request_id, "Ignoring end of unknown request");
            return false;
        };

        trace!(request_id = %request_id, "Request ended");
        self.observable.notify(&Signal::HttpRequestEnd { request });
        true
    }

    /// Number of started requests that have not ended.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Drops every subscriber and forgets in-flight requests.
    pub fn dispose(&self) {
        let dropped = std::mem::take(&mut *self.in_flight.borrow_mut()).len();
        self.observable.clear();
        debug!(in_flight = dropped, "HTTP request monitor disposed");
    }
}

impl Default for HttpRequestMonitor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn capture(monitor: &HttpRequestMonitor) -> Rc<RefCell<Vec<Signal>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        monitor
            .observable()
            .subscribe(move |signal: &Signal| sink.borrow_mut().push(signal.clone()));
        seen
    }

    #[test]
    fn test_start_and_end_share_request_payload() {
        let monitor = HttpRequestMonitor::default();
        let seen = capture(&monitor);

        let id = monitor
            .request_started("/api/cart", "POST", ApiType::Fetch)
            .expect("not ignored");
        assert_eq!(monitor.in_flight(), 1);
        assert!(monitor.request_ended(&id));
        assert_eq!(monitor.in_flight(), 0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        let (Signal::HttpRequestStart { request: start }, Signal::HttpRequestEnd { request: end }) =
            (&seen[0], &seen[1])
        else {
            panic!("unexpected signals: {seen:?}");
        };
        assert_eq!(start, end);
        assert_eq!(start.request_id, id);
        assert_eq!(start.method, "POST");
    }

    #[test]
    fn test_each_request_gets_distinct_id() {
        let monitor = HttpRequestMonitor::default();
        let a = monitor.request_started("/a", "GET", ApiType::Xhr);
        let b = monitor.request_started("/b", "GET", ApiType::Xhr);
        assert_ne!(a, b);
        assert_eq!(monitor.in_flight(), 2);
    }

    #[test]
    fn test_ignored_url_emits_nothing() {
        let monitor = HttpRequestMonitor::new(vec!["collector.example.com".to_string()]);
        let seen = capture(&monitor);

        let id = monitor.request_started("https://collector.example.com/collect", "POST", ApiType::Fetch);

        assert!(id.is_none());
        assert!(seen.borrow().is_empty());
        assert_eq!(monitor.in_flight(), 0);
    }

    #[test]
    fn test_unknown_or_repeated_end_is_ignored() {
        let monitor = HttpRequestMonitor::default();
        let seen = capture(&monitor);

        assert!(!monitor.request_ended("nope"));

        let id = monitor.request_started("/x", "GET", ApiType::Fetch).unwrap();
        assert!(monitor.request_ended(&id));
        assert!(!monitor.request_ended(&id));

        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_dispose_clears_subscribers_and_in_flight() {
        let monitor = HttpRequestMonitor::default();
        let seen = capture(&monitor);

        let id = monitor.request_started("/x", "GET", ApiType::Fetch).unwrap();
        monitor.dispose();

        assert_eq!(monitor.observable().subscriber_count(), 0);
        assert_eq!(monitor.in_flight(), 0);
        assert!(!monitor.request_ended(&id));
        assert_eq!(seen.borrow().len(), 1);
    }
}
