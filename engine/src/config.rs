//! Configuration module for the activity-window engine.
//!
//! This module handles parsing configuration from environment variables.
//! Every variable is optional; an empty environment yields [`Config::default`].
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `ACTWIN_INACTIVITY_MS` | No | 100 | Tracker inactivity timeout |
//! | `ACTWIN_DRAIN_TIMEOUT_MS` | No | 10000 | Tracker drain ceiling (>= inactivity) |
//! | `ACTWIN_FOLLOW_UP_MS` | No | 100 | Controller follow-up timeout |
//! | `ACTWIN_HALT_TIMEOUT_MS` | No | 10000 | Controller halt ceiling (>= follow-up) |
//! | `ACTWIN_IGNORED_URLS` | No | (none) | Comma-separated URL substrings the HTTP monitor skips |
//! | `ACTWIN_INTERACTION_EVENTS` | No | `click,keydown` | Comma-separated interaction names that trigger actions |
//! | `ACTWIN_LOG_FORMAT` | No | `text` | `text` or `json` |
//!
//! # Example
//!
//! ```no_run
//! use actwin_engine::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Follow-up: {:?}", config.follow_up());
//! ```

use std::env;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::trackers::{ControllerOptions, TrackerOptions};

/// Default tracker inactivity timeout (in milliseconds).
const DEFAULT_INACTIVITY_MS: u64 = 100;

/// Default tracker drain ceiling (in milliseconds).
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 10_000;

/// Default controller follow-up timeout (in milliseconds).
const DEFAULT_FOLLOW_UP_MS: u64 = 100;

/// Default controller halt ceiling (in milliseconds).
const DEFAULT_HALT_TIMEOUT_MS: u64 = 10_000;

/// Interaction names forwarded by default.
const DEFAULT_INTERACTION_EVENTS: &[&str] = &["click", "keydown"];

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Quiet period after which an activity window closes.
    pub inactivity_ms: u64,

    /// Upper bound on how long a window waits for outstanding operations.
    pub drain_timeout_ms: u64,

    /// Quiet period after which a user action is ended, cancelled or halted.
    pub follow_up_ms: u64,

    /// Upper bound on how long a halted action waits before it is force-ended.
    pub halt_timeout_ms: u64,

    /// URL substrings whose requests are never reported.
    /// Typically contains the collector endpoint so shipping telemetry does
    /// not feed back into action tracking.
    pub ignored_urls: Vec<String>,

    /// Interaction event names that start a user action.
    pub interaction_events: Vec<String>,

    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inactivity_ms: DEFAULT_INACTIVITY_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            follow_up_ms: DEFAULT_FOLLOW_UP_MS,
            halt_timeout_ms: DEFAULT_HALT_TIMEOUT_MS,
            ignored_urls: Vec::new(),
            interaction_events: DEFAULT_INTERACTION_EVENTS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a timeout variable is set but is not a positive integer
    /// - `ACTWIN_DRAIN_TIMEOUT_MS` is lower than the inactivity timeout
    /// - `ACTWIN_HALT_TIMEOUT_MS` is lower than the follow-up timeout
    /// - `ACTWIN_LOG_FORMAT` is neither `text` nor `json`
    pub fn from_env() -> Result<Self, ConfigError> {
        let inactivity_ms = parse_millis("ACTWIN_INACTIVITY_MS", DEFAULT_INACTIVITY_MS)?;
        let drain_timeout_ms = parse_millis("ACTWIN_DRAIN_TIMEOUT_MS", DEFAULT_DRAIN_TIMEOUT_MS)?;
        if drain_timeout_ms < inactivity_ms {
            return Err(ConfigError::InvalidValue {
                key: "ACTWIN_DRAIN_TIMEOUT_MS".to_string(),
                message: format!(
                    "drain timeout ({drain_timeout_ms}ms) must not be shorter than the inactivity timeout ({inactivity_ms}ms)"
                ),
            });
        }

        let follow_up_ms = parse_millis("ACTWIN_FOLLOW_UP_MS", DEFAULT_FOLLOW_UP_MS)?;
        let halt_timeout_ms = parse_millis("ACTWIN_HALT_TIMEOUT_MS", DEFAULT_HALT_TIMEOUT_MS)?;
        if halt_timeout_ms < follow_up_ms {
            return Err(ConfigError::InvalidValue {
                key: "ACTWIN_HALT_TIMEOUT_MS".to_string(),
                message: format!(
                    "halt timeout ({halt_timeout_ms}ms) must not be shorter than the follow-up timeout ({follow_up_ms}ms)"
                ),
            });
        }

        let ignored_urls = env::var("ACTWIN_IGNORED_URLS")
            .map(|val| split_list(&val))
            .unwrap_or_default();

        let interaction_events = match env::var("ACTWIN_INTERACTION_EVENTS") {
            Ok(val) => split_list(&val),
            Err(_) => Self::default().interaction_events,
        };

        let log_format = match env::var("ACTWIN_LOG_FORMAT") {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "ACTWIN_LOG_FORMAT".to_string(),
                        message: format!("expected 'text' or 'json', got '{val}'"),
                    })
                }
            },
            Err(_) => LogFormat::Text,
        };

        Ok(Self {
            inactivity_ms,
            drain_timeout_ms,
            follow_up_ms,
            halt_timeout_ms,
            ignored_urls,
            interaction_events,
            log_format,
        })
    }

    /// Tracker inactivity timeout.
    #[must_use]
    pub fn inactivity(&self) -> Duration {
        Duration::from_millis(self.inactivity_ms)
    }

    /// Tracker drain ceiling.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Controller follow-up timeout.
    #[must_use]
    pub fn follow_up(&self) -> Duration {
        Duration::from_millis(self.follow_up_ms)
    }

    /// Controller halt ceiling.
    #[must_use]
    pub fn halt_timeout(&self) -> Duration {
        Duration::from_millis(self.halt_timeout_ms)
    }

    /// Tracker options with these timeouts and the default (never blocking)
    /// classifiers.
    #[must_use]
    pub fn tracker_options<M: 'static>(&self) -> TrackerOptions<M> {
        TrackerOptions {
            inactivity: self.inactivity(),
            drain_timeout: self.drain_timeout(),
            ..TrackerOptions::default()
        }
    }

    /// Controller options with these timeouts.
    #[must_use]
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            follow_up: self.follow_up(),
            halt_timeout: self.halt_timeout(),
        }
    }
}

/// Parses an optional millisecond value that must be greater than zero.
fn parse_millis(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let ms = val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "timeout must be greater than 0".to_string(),
                });
            }
            Ok(ms)
        }
        Err(_) => Ok(default),
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all ACTWIN_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("ACTWIN_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        let leftover: Vec<String> = env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("ACTWIN_"))
            .collect();
        for key in leftover {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_empty_env_matches_default() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse empty environment");
            assert_eq!(config, Config::default());
            assert_eq!(config.inactivity(), Duration::from_millis(100));
            assert_eq!(config.drain_timeout(), Duration::from_secs(10));
            assert_eq!(config.interaction_events, vec!["click", "keydown"]);
            assert!(config.ignored_urls.is_empty());
            assert_eq!(config.log_format, LogFormat::Text);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("ACTWIN_INACTIVITY_MS", "50");
            env::set_var("ACTWIN_DRAIN_TIMEOUT_MS", "2000");
            env::set_var("ACTWIN_FOLLOW_UP_MS", "80");
            env::set_var("ACTWIN_HALT_TIMEOUT_MS", "5000");
            env::set_var("ACTWIN_IGNORED_URLS", "https://collector.example.com, /health");
            env::set_var("ACTWIN_INTERACTION_EVENTS", "pointerdown");
            env::set_var("ACTWIN_LOG_FORMAT", "JSON");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.inactivity_ms, 50);
            assert_eq!(config.drain_timeout_ms, 2000);
            assert_eq!(config.follow_up(), Duration::from_millis(80));
            assert_eq!(config.halt_timeout(), Duration::from_secs(5));
            assert_eq!(
                config.ignored_urls,
                vec!["https://collector.example.com".to_string(), "/health".to_string()]
            );
            assert_eq!(config.interaction_events, vec!["pointerdown".to_string()]);
            assert_eq!(config.log_format, LogFormat::Json);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_timeout() {
        with_clean_env(|| {
            env::set_var("ACTWIN_FOLLOW_UP_MS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "ACTWIN_FOLLOW_UP_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("ACTWIN_INACTIVITY_MS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "ACTWIN_INACTIVITY_MS" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_drain_shorter_than_inactivity_rejected() {
        with_clean_env(|| {
            env::set_var("ACTWIN_INACTIVITY_MS", "500");
            env::set_var("ACTWIN_DRAIN_TIMEOUT_MS", "100");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "ACTWIN_DRAIN_TIMEOUT_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_halt_shorter_than_follow_up_rejected() {
        with_clean_env(|| {
            env::set_var("ACTWIN_FOLLOW_UP_MS", "300");
            env::set_var("ACTWIN_HALT_TIMEOUT_MS", "200");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "ACTWIN_HALT_TIMEOUT_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_unknown_log_format_rejected() {
        with_clean_env(|| {
            env::set_var("ACTWIN_LOG_FORMAT", "yaml");

            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("ACTWIN_LOG_FORMAT"));
        });
    }

    #[test]
    #[serial]
    fn test_empty_interaction_list_disables_triggers() {
        with_clean_env(|| {
            env::set_var("ACTWIN_INTERACTION_EVENTS", " , ");

            let config = Config::from_env().expect("should parse");
            assert!(config.interaction_events.is_empty());
        });
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["inactivityMs"], 100);
        assert_eq!(json["haltTimeoutMs"], 10_000);
        assert_eq!(json["logFormat"], "text");
    }

    #[test]
    fn test_option_builders_use_configured_timeouts() {
        let config = Config {
            inactivity_ms: 10,
            drain_timeout_ms: 20,
            follow_up_ms: 30,
            halt_timeout_ms: 40,
            ..Config::default()
        };

        let tracker = config.tracker_options::<u8>();
        assert_eq!(tracker.inactivity, Duration::from_millis(10));
        assert_eq!(tracker.drain_timeout, Duration::from_millis(20));
        assert_eq!((tracker.is_blocking_start)(&1), None);

        let controller = config.controller_options();
        assert_eq!(controller.follow_up, Duration::from_millis(30));
        assert_eq!(controller.halt_timeout, Duration::from_millis(40));
    }
}
