//! Runtime settings for the sync engine.
//!
//! Defaults match the workspace protocol (30 s heartbeat, 60 s push/pull cycle,
//! 30 s request timeout). Every value can be overridden from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const DEFAULT_HEARTBEAT_SECS: u64 = 30;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Tunables shared by the transport, the engine and the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Interval between heartbeats
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
    /// Interval between push-then-pull cycles
    #[serde(with = "duration_secs")]
    pub sync_interval: Duration,
    /// Per-request HTTP timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Name this installation reports when joining a workspace
    pub client_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            client_name: default_client_name(),
        }
    }
}

impl SyncSettings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    ///
    /// Recognised keys: `TASKEY_HEARTBEAT_SECS`, `TASKEY_SYNC_INTERVAL_SECS`,
    /// `TASKEY_REQUEST_TIMEOUT_SECS` and `TASKEY_CLIENT_NAME`. Missing or blank
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        let get = |key: &str| normalize_text_option(lookup(key));

        if let Some(secs) = get("TASKEY_HEARTBEAT_SECS") {
            settings.heartbeat_interval = parse_interval("TASKEY_HEARTBEAT_SECS", &secs)?;
        }
        if let Some(secs) = get("TASKEY_SYNC_INTERVAL_SECS") {
            settings.sync_interval = parse_interval("TASKEY_SYNC_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = get("TASKEY_REQUEST_TIMEOUT_SECS") {
            settings.request_timeout = parse_interval("TASKEY_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(name) = get("TASKEY_CLIENT_NAME") {
            settings.client_name = name;
        }

        Ok(settings)
    }
}

fn parse_interval(key: &str, raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::InvalidInput(format!(
            "{key} must be a positive number of seconds, got '{raw}'"
        ))),
    }
}

/// Best-effort machine name, used as the default client name.
pub fn default_client_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| normalize_text_option(std::env::var(key).ok()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .and_then(|name| normalize_text_option(Some(name)))
        })
        .unwrap_or_else(|| "taskey".to_string())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_protocol_intervals() {
        let settings = SyncSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.sync_interval, Duration::from_secs(60));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!(!settings.client_name.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let settings = SyncSettings::from_lookup(lookup(&[
            ("TASKEY_HEARTBEAT_SECS", "5"),
            ("TASKEY_CLIENT_NAME", " laptop "),
            ("TASKEY_REQUEST_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.client_name, "laptop");
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let result = SyncSettings::from_lookup(lookup(&[("TASKEY_SYNC_INTERVAL_SECS", "soon")]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let zero = SyncSettings::from_lookup(lookup(&[("TASKEY_HEARTBEAT_SECS", "0")]));
        assert!(zero.is_err());
    }

    #[test]
    fn blank_values_keep_defaults() {
        let settings = SyncSettings::from_lookup(lookup(&[
            ("TASKEY_CLIENT_NAME", "   "),
            ("TASKEY_SYNC_INTERVAL_SECS", ""),
        ]))
        .unwrap();
        assert_eq!(settings.client_name, default_client_name());
        assert_eq!(settings.sync_interval, Duration::from_secs(60));
    }

    #[test]
    fn settings_roundtrip_through_json_seconds() {
        let settings = SyncSettings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["heartbeat_interval"], 30);
        let parsed: SyncSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, settings);
    }
}
