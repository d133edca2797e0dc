//! Launcher errors

use renderfarm_common::ConfigError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum LauncherError {
    /// Launcher configuration missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Event payload is not an S3 notification
    #[error("Invalid S3 event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    /// Object key is not valid percent-encoding
    #[error("Cannot decode object key '{key}'")]
    InvalidKey { key: String },

    #[error("Failed to send message to {queue_url}: {source}")]
    Enqueue {
        queue_url: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to start task {task_definition}: {source}")]
    StartTask {
        task_definition: String,
        #[source]
        source: BoxError,
    },

    /// RunTask succeeded as a call but ECS could not place the task
    #[error("ECS could not start task {task_definition}: {reasons}")]
    TaskNotPlaced {
        task_definition: String,
        reasons: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LauncherError::TaskNotPlaced {
            task_definition: "AppTask".to_string(),
            reasons: "RESOURCE:MEMORY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ECS could not start task AppTask: RESOURCE:MEMORY"
        );

        let err = LauncherError::InvalidKey {
            key: "%zz".to_string(),
        };
        assert!(err.to_string().contains("%zz"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: LauncherError = ConfigError::MissingEnv("RENDERFARM_LAUNCHER_CONFIG").into();
        assert_eq!(
            err.to_string(),
            "Environment variable RENDERFARM_LAUNCHER_CONFIG is not set"
        );
    }
}
