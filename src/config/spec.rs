//! Tool configuration types.
//!
//! This module defines the structs that map to `brokerdefs.yaml`. Every field
//! has a default, so an absent file or an empty document is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::definitions::ResourceSelector;
use crate::error::{ConfigError, Result};
use crate::planner::DeployOptions;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolConfig {
    /// Target broker.
    pub broker: BrokerConfig,
    /// Deployment policy.
    pub deploy: DeploySettings,
    /// Usage audit thresholds.
    pub audit: AuditConfig,
}

/// Connection settings for the broker management API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Management API base URL.
    pub url: String,
    /// Basic auth user.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per request for transient failures.
    pub max_retries: u32,
}

/// Deployment policy defaults; CLI flags are OR-ed on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeploySettings {
    /// Per-item delay step within a batch, in milliseconds.
    pub stagger_ms: u64,
    /// Skip the deletion phase.
    pub no_deletions: bool,
    /// Delete and recreate changed exchanges, queues and bindings.
    pub recreate_changed: bool,
    /// Resources excluded from diffing.
    pub ignore: Vec<ResourceSelector>,
}

/// Unused-ratio thresholds above which the audit warns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Threshold for queues.
    pub queue_threshold: f64,
    /// Threshold for exchanges.
    pub exchange_threshold: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:15672"),
            username: String::from("guest"),
            password: String::from("guest"),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            stagger_ms: 50,
            no_deletions: false,
            recreate_changed: false,
            ignore: Vec::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_threshold: 0.1,
            exchange_threshold: 0.1,
        }
    }
}

impl ToolConfig {
    /// Validates field values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<()> {
        let url = &self.broker.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::validation(
                format!("Broker URL must start with http:// or https://, got '{url}'"),
                "broker.url",
            )
            .into());
        }

        if self.broker.username.is_empty() {
            return Err(ConfigError::validation("Broker username is empty", "broker.username").into());
        }

        if self.broker.timeout_secs == 0 {
            return Err(
                ConfigError::validation("Timeout must be at least 1 second", "broker.timeout_secs")
                    .into(),
            );
        }

        for (field, value) in [
            ("audit.queue_threshold", self.audit.queue_threshold),
            ("audit.exchange_threshold", self.audit.exchange_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::validation(
                    format!("Threshold must be between 0 and 1, got {value}"),
                    field,
                )
                .into());
            }
        }

        Ok(())
    }
}

impl DeploySettings {
    /// Per-item delay step.
    #[must_use]
    pub const fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    /// Deployment options from these settings, with extra ignore selectors
    /// appended.
    #[must_use]
    pub fn to_options(&self, extra_ignore: Vec<ResourceSelector>) -> DeployOptions {
        let mut ignore = self.ignore.clone();
        ignore.extend(extra_ignore);
        DeployOptions {
            dry_run: false,
            no_deletions: self.no_deletions,
            recreate_changed: self.recreate_changed,
            ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ToolConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.broker.url, "http://localhost:15672");
        assert_eq!(config.deploy.stagger(), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ToolConfig::default();
        config.broker.url = String::from("localhost:15672");
        assert!(config.validate().is_err());

        let mut config = ToolConfig::default();
        config.audit.exchange_threshold = 1.5;
        let err = config.validate().expect_err("threshold");
        assert!(err.to_string().contains("between 0 and 1"));
    }

    #[test]
    fn test_options_merge_ignore_lists() {
        let settings = DeploySettings {
            no_deletions: true,
            ignore: vec![ResourceSelector {
                vhost: String::from("/"),
                exchange: None,
                queue: None,
            }],
            ..DeploySettings::default()
        };

        let options = settings.to_options(vec![ResourceSelector {
            vhost: String::from("tmp"),
            exchange: None,
            queue: Some(String::from("q")),
        }]);

        assert!(options.no_deletions);
        assert_eq!(options.ignore.len(), 2);
    }
}
