//! Message and telemetry types shared across the engine.
//!
//! This module defines the closed [`Signal`] union carried by monitor
//! observables and the [`TelemetryItem`] buffered by user actions. Tags
//! serialize as snake_case, fields as camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated short identifiers (request and action ids).
const SHORT_ID_LEN: usize = 10;

/// Measurement name excluded from action tagging.
const WEB_VITALS_MEASUREMENT: &str = "web-vitals";

/// Which platform API issued an HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    #[default]
    Fetch,
    Xhr,
}

/// Payload shared by the start and end messages of one HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    /// Correlation id pairing start and end.
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub api_type: ApiType,
}

/// A signal observed by a monitor.
///
/// `HttpRequestStart` and `HttpRequestEnd` are the blocking shapes: they carry
/// a request id that pairs them. Every other variant is an ordinary signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// An HTTP request went out.
    HttpRequestStart { request: HttpRequest },
    /// An HTTP request completed, failed or was aborted.
    HttpRequestEnd { request: HttpRequest },
    /// The DOM changed.
    DomMutation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// A resource performance entry was recorded.
    ResourceEntry {
        name: String,
        #[serde(rename = "durationMs", default)]
        duration_ms: f64,
    },
    /// A user interaction (pointer, keyboard) happened.
    Interaction {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

impl Signal {
    /// Wire tag of this signal.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::HttpRequestStart { .. } => "http_request_start",
            Self::HttpRequestEnd { .. } => "http_request_end",
            Self::DomMutation { .. } => "dom_mutation",
            Self::ResourceEntry { .. } => "resource_entry",
            Self::Interaction { .. } => "interaction",
        }
    }

    /// Whether this is an `http_request_end` message.
    #[must_use]
    pub fn is_request_end(&self) -> bool {
        matches!(self, Self::HttpRequestEnd { .. })
    }
}

/// Blocking-start classifier: the request id of an `http_request_start`.
#[must_use]
pub fn request_start_key(signal: &Signal) -> Option<String> {
    match signal {
        Signal::HttpRequestStart { request } => Some(request.request_id.clone()),
        Signal::HttpRequestEnd { .. }
        | Signal::DomMutation { .. }
        | Signal::ResourceEntry { .. }
        | Signal::Interaction { .. } => None,
    }
}

/// Blocking-end classifier: the request id of an `http_request_end`.
#[must_use]
pub fn request_end_key(signal: &Signal) -> Option<String> {
    match signal {
        Signal::HttpRequestEnd { request } => Some(request.request_id.clone()),
        Signal::HttpRequestStart { .. }
        | Signal::DomMutation { .. }
        | Signal::ResourceEntry { .. }
        | Signal::Interaction { .. } => None,
    }
}

/// Kind of a buffered telemetry item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Log,
    Exception,
    Measurement,
    Event,
    Trace,
}

/// Correlation attached to items flushed by an ended user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRef {
    pub parent_id: String,
    pub name: String,
}

/// A unit of telemetry produced by the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryItem {
    pub kind: ItemKind,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRef>,
}

impl TelemetryItem {
    /// Creates an untagged item stamped with the current time.
    #[must_use]
    pub fn new(kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            timestamp: Utc::now(),
            attributes: BTreeMap::new(),
            action: None,
        }
    }

    /// Adds one attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether this is a web-vitals measurement (never tagged with an action).
    #[must_use]
    pub fn is_web_vitals(&self) -> bool {
        self.kind == ItemKind::Measurement && self.name == WEB_VITALS_MEASUREMENT
    }
}

/// Generates a short lowercase alphanumeric identifier.
pub(crate) fn generate_short_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    (0..SHORT_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> HttpRequest {
        HttpRequest {
            request_id: id.to_string(),
            url: "/api/cart".to_string(),
            method: "POST".to_string(),
            api_type: ApiType::Xhr,
        }
    }

    #[test]
    fn short_id_has_expected_format() {
        let id = generate_short_id();
        assert_eq!(id.len(), SHORT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn request_start_serializes_with_type_tag() {
        let signal = Signal::HttpRequestStart {
            request: request("abc"),
        };

        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "http_request_start");
        assert_eq!(json["request"]["requestId"], "abc");
        assert_eq!(json["request"]["apiType"], "xhr");
        assert_eq!(json["request"]["method"], "POST");
    }

    #[test]
    fn signal_deserializes_from_wire_shape() {
        let signal: Signal = serde_json::from_str(
            r#"{"type":"http_request_end","request":{"requestId":"r1","url":"/x","method":"GET","apiType":"fetch"}}"#,
        )
        .unwrap();
        assert_eq!(
            signal,
            Signal::HttpRequestEnd {
                request: HttpRequest {
                    request_id: "r1".to_string(),
                    url: "/x".to_string(),
                    method: "GET".to_string(),
                    api_type: ApiType::Fetch,
                }
            }
        );

        let mutation: Signal = serde_json::from_str(r#"{"type":"dom_mutation"}"#).unwrap();
        assert_eq!(mutation, Signal::DomMutation { target: None });
    }

    #[test]
    fn resource_entry_uses_camel_case_duration() {
        let signal = Signal::ResourceEntry {
            name: "/app.js".to_string(),
            duration_ms: 12.5,
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "resource_entry");
        assert_eq!(json["durationMs"], 12.5);
    }

    #[test]
    fn type_name_matches_serde_tag() {
        let signals = [
            Signal::HttpRequestStart { request: request("a") },
            Signal::HttpRequestEnd { request: request("a") },
            Signal::DomMutation { target: None },
            Signal::ResourceEntry {
                name: "x".to_string(),
                duration_ms: 0.0,
            },
            Signal::Interaction {
                name: "click".to_string(),
                target: None,
            },
        ];

        for signal in signals {
            let json = serde_json::to_value(&signal).unwrap();
            assert_eq!(json["type"], signal.type_name());
        }
    }

    #[test]
    fn classifiers_extract_request_ids() {
        let start = Signal::HttpRequestStart { request: request("k") };
        let end = Signal::HttpRequestEnd { request: request("k") };
        let other = Signal::DomMutation { target: None };

        assert_eq!(request_start_key(&start), Some("k".to_string()));
        assert_eq!(request_start_key(&end), None);
        assert_eq!(request_start_key(&other), None);

        assert_eq!(request_end_key(&end), Some("k".to_string()));
        assert_eq!(request_end_key(&start), None);
        assert_eq!(request_end_key(&other), None);

        assert!(end.is_request_end());
        assert!(!start.is_request_end());
    }

    #[test]
    fn telemetry_item_skips_empty_optional_fields() {
        let item = TelemetryItem::new(ItemKind::Log, "hello");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "log");
        assert!(json.get("action").is_none());
        assert!(json.get("attributes").is_none());
    }

    #[test]
    fn telemetry_item_action_serializes_camel_case() {
        let mut item = TelemetryItem::new(ItemKind::Event, "checkout").with_attribute("step", "2");
        item.action = Some(ActionRef {
            parent_id: "abc".to_string(),
            name: "click".to_string(),
        });

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["action"]["parentId"], "abc");
        assert_eq!(json["attributes"]["step"], "2");
    }

    #[test]
    fn web_vitals_detection() {
        assert!(TelemetryItem::new(ItemKind::Measurement, "web-vitals").is_web_vitals());
        assert!(!TelemetryItem::new(ItemKind::Measurement, "custom").is_web_vitals());
        assert!(!TelemetryItem::new(ItemKind::Event, "web-vitals").is_web_vitals());
    }
}
