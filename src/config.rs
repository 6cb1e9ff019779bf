//! Application configuration: a YAML file merged with environment
//! variable overrides.
//!
//! Lookup order: the path in `FANOUT_CONFIG` (a hard error if unreadable),
//! then `fanout.yml` / `fanout.yaml` in the working directory, then
//! `/etc/fanout/fanout.yml`. `TOPIC_ARN`, `SERVICE_NAME`, and `ENVIRONMENT`
//! override the file regardless of where it was found.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

const DEFAULT_PATHS: [&str; 3] = ["fanout.yml", "fanout.yaml", "/etc/fanout/fanout.yml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Destination topic. Required; never considered secret.
    pub topic_arn: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_service_name() -> String {
    "DataProcessingService".to_string()
}

fn default_environment() -> String {
    "Production".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found (set FANOUT_CONFIG or provide fanout.yml)")]
    NotFound,
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("topic_arn cannot be empty")]
    MissingTopicArn,
}

impl AppConfig {
    /// Load, merge environment overrides, and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("FANOUT_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => {
                let path = DEFAULT_PATHS
                    .iter()
                    .find(|p| Path::new(p).exists())
                    .ok_or(ConfigError::NotFound)?;
                Self::from_file(path)?
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
        serde_yaml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_string(), source })
    }

    fn apply_env_overrides(&mut self) {
        for (var, field) in [
            ("TOPIC_ARN", &mut self.topic_arn as &mut String),
            ("SERVICE_NAME", &mut self.service_name),
            ("ENVIRONMENT", &mut self.environment),
        ] {
            if let Ok(value) = env::var(var) {
                if !value.is_empty() {
                    *field = value;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic_arn.trim().is_empty() {
            return Err(ConfigError::MissingTopicArn);
        }
        Ok(())
    }
}
