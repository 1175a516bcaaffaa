//! Sync configuration types.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Default seconds between periodic outbound pushes.
pub const DEFAULT_PUSH_INTERVAL_SECS: u64 = 120;
/// Default bound on one remote push call.
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 30;
/// Default seconds between change-feed polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Remote sync configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote REST endpoint. Sync is disabled when unset.
    pub remote_url: Option<String>,
    /// API key sent with every remote request.
    pub api_key: Option<String>,
    pub push_interval_secs: u64,
    pub push_timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Remote parent id per silo, for remote schemas that require one.
    pub parents: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            push_interval_secs: DEFAULT_PUSH_INTERVAL_SECS,
            push_timeout_secs: DEFAULT_PUSH_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            parents: HashMap::new(),
        }
    }
}

impl SyncConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs.max(1))
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn is_enabled(&self) -> bool {
        self.remote_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_default() {
        let sync = SyncConfig::default();
        assert_eq!(sync.push_interval(), Duration::from_secs(120));
        assert_eq!(sync.push_timeout(), Duration::from_secs(30));
        assert!(!sync.is_enabled());
        assert!(sync.parents.is_empty());
    }

    #[test]
    fn test_sync_config_from_yaml() {
        let yaml = r#"
remote_url: "https://example.test/rest/v1"
push_interval_secs: 60
parents:
  silo-001: farm-1
"#;
        let sync: SyncConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(sync.is_enabled());
        assert_eq!(sync.push_interval_secs, 60);
        assert_eq!(sync.push_timeout_secs, DEFAULT_PUSH_TIMEOUT_SECS);
        assert_eq!(sync.parents.get("silo-001").map(String::as_str), Some("farm-1"));
    }
}
