// src/config.rs

use crate::entry::{
    DEFAULT_MAX_FAILURE_COUNT, DEFAULT_MAX_USAGE_COUNT, DEFAULT_ROTATION_INTERVAL,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Pool-wide defaults applied to keys registered without explicit limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RotationDefaults {
    pub rotation_interval_secs: u64,
    pub max_usage_count: u64,
    pub max_failure_count: u32,
}

impl Default for RotationDefaults {
    fn default() -> Self {
        Self {
            rotation_interval_secs: DEFAULT_ROTATION_INTERVAL.as_secs(),
            max_usage_count: DEFAULT_MAX_USAGE_COUNT,
            max_failure_count: DEFAULT_MAX_FAILURE_COUNT,
        }
    }
}

impl RotationDefaults {
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    /// All limits must be positive; a zero cap would make every key
    /// unusable from the moment it is registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!("validating rotation defaults");
        if self.rotation_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "rotation_interval_secs",
                message: "rotation interval must be positive".to_string(),
            });
        }
        if self.max_usage_count == 0 {
            return Err(ConfigError::Validation {
                field: "max_usage_count",
                message: "usage cap must be positive".to_string(),
            });
        }
        if self.max_failure_count == 0 {
            return Err(ConfigError::Validation {
                field: "max_failure_count",
                message: "failure cap must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Loads and validates defaults from a YAML file. Missing fields fall
    /// back to the built-in defaults.
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let defaults: Self = serde_yaml::from_str(&raw)?;
        defaults.validate()?;
        info!(
            config.path = %path.display(),
            rotation_interval_secs = defaults.rotation_interval_secs,
            max_usage_count = defaults.max_usage_count,
            max_failure_count = defaults.max_failure_count,
            "loaded rotation defaults"
        );
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults_match_documented_policy() {
        let defaults = RotationDefaults::default();

        assert_eq!(defaults.rotation_interval(), Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(defaults.max_usage_count, 1000);
        assert_eq!(defaults.max_failure_count, 10);
        assert!(defaults.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let defaults = RotationDefaults {
            max_usage_count: 0,
            ..RotationDefaults::default()
        };

        let err = defaults.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation { field: "max_usage_count", .. }
        ));
    }

    #[tokio::test]
    async fn partial_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.yaml");
        tokio::fs::write(&path, "max_failure_count: 5\n").await.unwrap();

        let defaults = RotationDefaults::from_yaml_file(&path).await.unwrap();

        assert_eq!(defaults.max_failure_count, 5);
        assert_eq!(defaults.max_usage_count, 1000);
    }

    #[tokio::test]
    async fn invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.yaml");
        tokio::fs::write(&path, "rotation_interval_secs: [not, a, number]\n")
            .await
            .unwrap();

        let err = RotationDefaults::from_yaml_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::YamlParsing(_)));
    }
}
