//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the on-disk JSON
//! format. Each type implements [`Default`] with production default values,
//! and `#[serde(default)]` allows partial JSON — missing fields get their
//! default during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings for the delve client.
///
/// Loaded from `~/.delve/settings.json` with defaults applied for missing
/// fields; `DELVE_*` environment variables override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelveSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Remote endpoint configuration.
    pub endpoints: EndpointSettings,
    /// Client runtime behavior.
    pub client: ClientSettings,
    /// Human-approval behavior.
    pub approval: ApprovalSettings,
    /// Local storage configuration.
    pub storage: StorageSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for DelveSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "delve".to_string(),
            endpoints: EndpointSettings::default(),
            client: ClientSettings::default(),
            approval: ApprovalSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl DelveSettings {
    /// Correct invalid values instead of rejecting them.
    ///
    /// Called automatically during loading. Users get corrected behavior
    /// with a warning rather than a confusing startup error.
    pub fn validate(&mut self) {
        if self.client.heartbeat_interval_secs == 0 {
            tracing::warn!("heartbeatIntervalSecs must be positive, using 5");
            self.client.heartbeat_interval_secs = 5;
        }
        if self.client.poll_interval_secs == 0 {
            tracing::warn!("pollIntervalSecs must be positive, using 3");
            self.client.poll_interval_secs = 3;
        }
        if self.client.bus_capacity == 0 {
            tracing::warn!("busCapacity must be positive, using 256");
            self.client.bus_capacity = 256;
        }
        if self.approval.cadence == Some(0) {
            tracing::warn!("approval cadence of 0 is invalid, disabling");
            self.approval.cadence = None;
        }
    }
}

/// Remote endpoints of the research compute backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSettings {
    /// Backend base URL.
    pub base_url: String,
    /// Path of the streaming research endpoint.
    pub stream_path: String,
    /// Path of the state snapshot endpoint.
    pub state_path: String,
    /// Path of the human-approval endpoint.
    pub approval_path: String,
    /// Path of the user-model collection endpoint.
    pub user_models_path: String,
    /// Timeout for non-streaming requests, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.delve.dev".to_string(),
            stream_path: "/research/stream".to_string(),
            state_path: "/research/state".to_string(),
            approval_path: "/research/approval".to_string(),
            user_models_path: "/user-models".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl EndpointSettings {
    /// Absolute URL of the stream endpoint.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.stream_path)
    }

    /// Absolute URL of the state endpoint.
    #[must_use]
    pub fn state_url(&self) -> String {
        format!("{}{}", self.base_url, self.state_path)
    }

    /// Absolute URL of the approval endpoint.
    #[must_use]
    pub fn approval_url(&self) -> String {
        format!("{}{}", self.base_url, self.approval_path)
    }

    /// Absolute URL of the user-model collection.
    #[must_use]
    pub fn user_models_url(&self) -> String {
        format!("{}{}", self.base_url, self.user_models_path)
    }
}

/// Client runtime behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Default backend model, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Heartbeat tick interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Polling-fallback interval in seconds.
    pub poll_interval_secs: u64,
    /// Maximum polling attempts before giving up.
    pub poll_max_attempts: u32,
    /// Event bus channel capacity.
    pub bus_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            model: None,
            heartbeat_interval_secs: 5,
            poll_interval_secs: 3,
            poll_max_attempts: 40,
            bus_capacity: 256,
        }
    }
}

/// Human-approval behavior.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalSettings {
    /// When set, every Nth reasoning step synthesizes an approval request.
    /// Off by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cadence: Option<u32>,
}

/// Local storage configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Path of the SQLite cache database. Defaults to `~/.delve/delve.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<std::path::PathBuf>,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter, overridable via `DELVE_LOG`.
    pub level: String,
    /// Emit JSON-formatted logs.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = DelveSettings::default();
        assert_eq!(s.name, "delve");
        assert_eq!(s.client.heartbeat_interval_secs, 5);
        assert_eq!(s.client.poll_interval_secs, 3);
        assert!(s.approval.cadence.is_none());
        assert!(s.storage.db_path.is_none());
    }

    #[test]
    fn endpoint_urls_join_base_and_path() {
        let e = EndpointSettings {
            base_url: "http://localhost:9000".into(),
            ..EndpointSettings::default()
        };
        assert_eq!(e.stream_url(), "http://localhost:9000/research/stream");
        assert_eq!(e.state_url(), "http://localhost:9000/research/state");
        assert_eq!(e.approval_url(), "http://localhost:9000/research/approval");
        assert_eq!(e.user_models_url(), "http://localhost:9000/user-models");
    }

    #[test]
    fn partial_json_gets_defaults() {
        let s: DelveSettings =
            serde_json::from_str(r#"{"client":{"heartbeatIntervalSecs":10}}"#).unwrap();
        assert_eq!(s.client.heartbeat_interval_secs, 10);
        assert_eq!(s.client.poll_interval_secs, 3);
        assert_eq!(s.endpoints.base_url, "https://api.delve.dev");
    }

    #[test]
    fn validate_corrects_zero_intervals() {
        let mut s = DelveSettings::default();
        s.client.heartbeat_interval_secs = 0;
        s.client.bus_capacity = 0;
        s.approval.cadence = Some(0);
        s.validate();
        assert_eq!(s.client.heartbeat_interval_secs, 5);
        assert_eq!(s.client.bus_capacity, 256);
        assert!(s.approval.cadence.is_none());
    }
}
