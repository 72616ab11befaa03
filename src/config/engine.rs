//! Workflow engine connection configuration.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! base_url = "https://bpm.internal/engine-rest"
//! username = "${ENGINE_USER}"
//! password = "${ENGINE_PASSWORD}"
//! timeout_secs = 30
//! resource_root = "./processes"
//! ```

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Connection settings for the engine's REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL of the engine REST API.
    /// Default: "http://localhost:8080/engine-rest"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Username for HTTP basic auth. Must be set together with `password`.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for HTTP basic auth.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds.
    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory that relative deployment resources are resolved against.
    /// Default: current directory
    #[serde(default = "default_resource_root")]
    pub resource_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            resource_root: default_resource_root(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/engine-rest".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_resource_root() -> PathBuf {
    PathBuf::from(".")
}

impl EngineConfig {
    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!("engine.base_url '{}' is invalid: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "engine.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Validation(
                "engine.username and engine.password must be set together".into(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
