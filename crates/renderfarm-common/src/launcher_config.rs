//! Launcher configuration shared between provisioner and launcher
//!
//! The provisioner serializes this configuration to JSON and sets it as an
//! environment variable of the launcher function. The launcher reads it at
//! cold start to know where to enqueue jobs and which task to start.

use crate::defaults::{LAUNCHER_CONFIG_ENV, default_cluster};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Launcher configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field failed validation
    #[error("Invalid launcher config: {0}")]
    Invalid(#[from] garde::Report),

    /// Failed to parse JSON configuration
    #[error("Failed to parse launcher config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration variable missing from the environment
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Configuration document for the launcher function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    /// URL of the SQS queue that receives render jobs
    #[garde(length(min = 1))]
    pub queue_url: String,

    /// ECS task definition family started for each job
    #[garde(length(min = 1))]
    pub task_definition: String,

    /// ECS cluster the task runs in
    #[serde(default = "default_cluster")]
    #[garde(length(min = 1))]
    pub cluster: String,

    /// Accepted object key suffixes. `None` accepts every key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub key_suffix_allowlist: Option<Vec<String>>,
}

impl LauncherConfig {
    /// Parse and validate a configuration document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        garde::Validate::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from the launcher's environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let json = std::env::var(LAUNCHER_CONFIG_ENV)
            .map_err(|_| ConfigError::MissingEnv(LAUNCHER_CONFIG_ENV))?;
        Self::from_json(&json)
    }

    /// Serialize to the compact JSON stored in the function environment.
    ///
    /// Field order is fixed by the struct, so equal configs serialize to
    /// equal strings.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check whether an uploaded object key should start a render job.
    ///
    /// An empty allowlist rejects every key.
    pub fn accepts_key(&self, key: &str) -> bool {
        match &self.key_suffix_allowlist {
            None => true,
            Some(suffixes) => suffixes.iter().any(|suffix| key.ends_with(suffix.as_str())),
        }
    }
}
