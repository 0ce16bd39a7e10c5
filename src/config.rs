//! Configuration for the feature aggregator.

use crate::core::channel::Channel;
use crate::core::windowing::{WindowSpec, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every recognised option of an aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of most recent records kept for windowing
    pub capacity: usize,

    /// Channel filters, in column order
    pub channels: Vec<Channel>,

    /// Window filters, in column order
    pub windows: Vec<WindowSpec>,

    /// Emit rows that contain undefined values
    pub allow_incomplete: bool,

    /// Compute everything but write nothing
    pub dry_run: bool,

    /// Log per-line details
    pub verbose: bool,

    /// Lines starting with this marker are forwarded unchanged
    pub comment_marker: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            channels: Channel::defaults(),
            windows: WindowSpec::defaults(),
            allow_incomplete: false,
            dry_run: false,
            verbose: false,
            comment_marker: "#".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file. Missing fields take defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rssi-features")
            .join("config.json")
    }

    /// Reject configurations that cannot produce a well-formed table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.channels.is_empty() || self.windows.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one channel and one window are required".into(),
            ));
        }
        if self.comment_marker.is_empty() {
            return Err(ConfigError::Invalid("comment marker must not be empty".into()));
        }
        for channel in &self.channels {
            channel
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        for window in &self.windows {
            if let WindowSpec::Time { seconds } = *window {
                if seconds == 0 {
                    return Err(ConfigError::Invalid(
                        "time windows must span at least 1 second".into(),
                    ));
                }
                if window.span().is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "time window of {seconds} seconds is too long"
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            for window in &self.windows {
                let prefix = format!("{}_{}", channel.name(), window.name());
                if !seen.insert(prefix.clone()) {
                    return Err(ConfigError::Invalid(format!("duplicate columns for {prefix}")));
                }
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capacity, 50);
        assert_eq!(config.channels.len(), 4);
        assert_eq!(config.windows.len(), 7);
        assert!(!config.allow_incomplete);
        assert!(!config.dry_run);
        assert!(!config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"capacity": 10, "channels": [1, "all"]}"#).unwrap();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.channels, vec![Channel::Index(1), Channel::All]);
        assert_eq!(config.windows, WindowSpec::defaults());
    }

    #[test]
    fn test_invalid_channel_is_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"channels": [0, 3]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_capacity() {
        let config = Config {
            windows: vec![WindowSpec::Count { count: 5 }, WindowSpec::Count { count: 5 }],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unchecked_channel() {
        let config = Config {
            channels: vec![Channel::Index(0), Channel::Index(3)],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_span() {
        let config = Config {
            windows: vec![WindowSpec::Time { seconds: u64::MAX }],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let result = serde_json::from_str::<Config>(r#"{"windows": [{"seconds": 0}]}"#)
            .unwrap()
            .validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join("rssi-features-config-test")
            .join("config.json");
        let config = Config {
            capacity: 20,
            allow_incomplete: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
