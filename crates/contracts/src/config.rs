//! AgentConfig - Config Loader output
//!
//! Describes the state registry and the list of configured inputs. Settings
//! specific to an input type are kept as a raw JSON map and interpreted by the
//! input type's own configuration step.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ContractError;

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// State registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Configured inputs
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

/// Persisted cursor registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory of the file backend (None = in-memory)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How often the reaper scans for stale entries
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_reap_interval_secs() -> u64 {
    60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: None,
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

/// One configured input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// User supplied id; part of every resource key when set
    #[serde(default)]
    pub id: Option<String>,

    /// Input type (e.g. "filestream")
    #[serde(rename = "type")]
    pub input_type: String,

    /// How long a released cursor is kept before it may be reaped
    #[serde(default)]
    pub clean_inactive_secs: Option<u64>,

    /// Type specific settings
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl InputConfig {
    /// Create a config for the given type with no settings
    pub fn new(input_type: impl Into<String>) -> Self {
        Self {
            id: None,
            input_type: input_type.into(),
            clean_inactive_secs: None,
            settings: Map::new(),
        }
    }

    /// Set the user id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a type specific setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn clean_inactive(&self) -> Option<Duration> {
        self.clean_inactive_secs.map(Duration::from_secs)
    }

    /// Decode one setting
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContractError> {
        match self.settings.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ContractError::config_validation(
                    format!("{}.{key}", self.input_type),
                    e.to_string(),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_config_flattens_settings() {
        let json = r#"{ "type": "filestream", "id": "logs", "paths": ["/a", "/b"] }"#;
        let cfg: InputConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.input_type, "filestream");
        assert_eq!(cfg.id.as_deref(), Some("logs"));
        let paths: Vec<String> = cfg.setting("paths").unwrap().unwrap();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert!(cfg.setting::<String>("missing").unwrap().is_none());
    }

    #[test]
    fn test_setting_type_mismatch_is_validation_error() {
        let cfg = InputConfig::new("udp").with_setting("port", "not-a-number");
        let err = cfg.setting::<u16>("port").unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        assert!(err.to_string().contains("udp.port"));
    }

    #[test]
    fn test_registry_defaults() {
        let cfg = AgentConfig::default();
        assert!(cfg.registry.path.is_none());
        assert_eq!(cfg.registry.reap_interval(), Duration::from_secs(60));
    }
}
