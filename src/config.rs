//! Process-wide configuration.
//!
//! Loaded once at startup from a JSON file; every field is optional and
//! falls back to its default. The file path comes from `--config` or the
//! `TIERSTORE_CONFIG` environment variable.
//!
//! ```json
//! {
//!   "storage":   { "hot_access_count": 40, "stale_after_days": 14 },
//!   "profile":   { "prioritize_speed": true },
//!   "scheduler": { "interval_secs": 900 }
//! }
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::PerformanceProfile;
use crate::error::{TierError, TierResult};
use crate::maintenance::SchedulerConfig;
use crate::storage::StorageTierConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TIERSTORE_CONFIG";

/// Aggregate configuration for the engine, tiering and scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    pub storage: StorageTierConfig,
    pub profile: PerformanceProfile,
    pub scheduler: SchedulerConfig,
}

impl TieringConfig {
    /// Parse and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TierResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| TierError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config = Self::from_json(&raw).map_err(|e| match e {
            TierError::Config { message } => TierError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> TierResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| TierError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then `TIERSTORE_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> TierResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> TierResult<()> {
        self.storage.validate()?;
        if self.profile.max_memory_usage == 0 {
            return Err(TierError::Config {
                message: "profile.max_memory_usage must be positive".to_string(),
            });
        }
        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            return Err(TierError::Config {
                message: "scheduler.interval_secs must be positive when enabled".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<(), String> {
        let mut file = NamedTempFile::new().map_err(|e| e.to_string())?;
        writeln!(
            file,
            r#"{{ "storage": {{ "hot_access_count": 40 }}, "profile": {{ "prioritize_speed": true }} }}"#
        )
        .map_err(|e| e.to_string())?;

        let config = TieringConfig::from_file(file.path()).map_err(|e| e.to_string())?;
        assert_eq!(config.storage.hot_access_count, 40);
        assert_eq!(config.storage.warm_access_count, 10);
        assert!(config.profile.prioritize_speed);
        assert!(config.profile.enable_dictionary);
        assert_eq!(config.scheduler, SchedulerConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = TieringConfig::from_json(r#"{ "storage": { "active_threshold": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, TierError::Config { .. }));

        assert!(TieringConfig::from_json(r#"{ "profile": { "max_memory_usage": 0 } }"#).is_err());
        assert!(TieringConfig::from_json(r#"{ "scheduler": { "interval_secs": 0 } }"#).is_err());
        assert!(TieringConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = TieringConfig::from_file("/nonexistent/tierstore.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tierstore.json"));
    }

    #[test]
    fn test_load_prefers_explicit_path() -> Result<(), String> {
        let mut file = NamedTempFile::new().map_err(|e| e.to_string())?;
        write!(file, r#"{{ "scheduler": {{ "enabled": false }} }}"#).map_err(|e| e.to_string())?;
        let config = TieringConfig::load(Some(file.path())).map_err(|e| e.to_string())?;
        assert!(!config.scheduler.enabled);
        Ok(())
    }
}
