//! Retention policy configuration.
//!
//! Configures which process instances get purged and how often.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//!
//! [[retention.policies]]
//! type = "stale_tasks"
//! process_definition_id = "loan-approval:3"
//! retention_days = 30
//!
//! [[retention.policies]]
//! type = "stale_tasks_by_key"
//! process_key = "expense-claim"
//! retention_days = 90
//!
//! [[retention.policies]]
//! type = "all_instances"
//! process_key = "legacy-import"
//!
//! [retention.safety]
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Retention configuration.
///
/// When enabled, the retention worker periodically applies every policy in
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the retention worker runs.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the retention worker (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Policies applied on every run, in order.
    #[serde(default)]
    pub policies: Vec<RetentionPolicy>,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            policies: Vec::new(),
            safety: RetentionSafety::default(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

/// A single cleanup rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RetentionPolicy {
    /// Delete instances of one definition whose tasks are older than
    /// `retention_days`. Without `retention_days` every instance with an
    /// outstanding task is deleted.
    StaleTasks {
        process_definition_id: String,
        #[serde(default)]
        retention_days: Option<u32>,
    },

    /// Same as `stale_tasks`, for every definition registered under a key.
    StaleTasksByKey {
        process_key: String,
        #[serde(default)]
        retention_days: Option<u32>,
    },

    /// Delete every live instance of every definition under a key.
    AllInstances { process_key: String },
}

impl RetentionPolicy {
    /// Short label used in logs.
    pub fn describe(&self) -> String {
        match self {
            RetentionPolicy::StaleTasks {
                process_definition_id,
                retention_days,
            } => format!(
                "stale_tasks({process_definition_id}, {})",
                days_label(*retention_days)
            ),
            RetentionPolicy::StaleTasksByKey {
                process_key,
                retention_days,
            } => format!(
                "stale_tasks_by_key({process_key}, {})",
                days_label(*retention_days)
            ),
            RetentionPolicy::AllInstances { process_key } => {
                format!("all_instances({process_key})")
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let (field, value) = match self {
            RetentionPolicy::StaleTasks {
                process_definition_id,
                ..
            } => ("process_definition_id", process_definition_id),
            RetentionPolicy::StaleTasksByKey { process_key, .. }
            | RetentionPolicy::AllInstances { process_key } => ("process_key", process_key),
        };
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "retention policy {} has an empty {field}",
                self.describe()
            )));
        }
        Ok(())
    }
}

fn days_label(days: Option<u32>) -> String {
    match days {
        Some(days) => format!("{days}d"),
        None => "no cutoff".to_string(),
    }
}

/// Safety settings for retention runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, log what would be deleted without deleting.
    /// Useful for testing retention policies.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl RetentionConfig {
    /// Check if any policies are configured.
    pub fn has_policies(&self) -> bool {
        !self.policies.is_empty()
    }

    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be greater than 0".into(),
            ));
        }
        if self.interval_hours.checked_mul(3600).is_none() {
            return Err(ConfigError::Validation(format!(
                "retention.interval_hours {} is too large",
                self.interval_hours
            )));
        }
        self.policies.iter().try_for_each(RetentionPolicy::validate)
    }
}
