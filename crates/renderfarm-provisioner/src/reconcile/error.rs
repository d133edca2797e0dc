//! Reconciliation error taxonomy

use thiserror::Error;

/// Boxed error carried by [`ReconcileError::Sdk`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while reconciling a single resource.
///
/// `resource` fields hold a human readable description such as
/// `queue 'AppQueue'`.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource does not exist and cannot be created here
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// A lookup failed in a way that may succeed on the next attempt
    #[error("Transient failure looking up {resource}: {message}")]
    TransientLookup { resource: String, message: String },

    /// Create or update collided with a concurrent change
    #[error("{resource} was changed concurrently: {message}")]
    Conflict { resource: String, message: String },

    /// Retries were exhausted before the resource became visible
    #[error(
        "Reconciliation of {resource} timed out after {attempts} attempts{}",
        last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
    )]
    ReconciliationTimeout {
        resource: String,
        attempts: u32,
        last_error: Option<String>,
    },

    /// A provider response did not have the expected shape
    #[error("Malformed response for {resource}: {message}")]
    MalformedResponse { resource: String, message: String },

    /// The resource differs in an attribute that cannot be changed in place
    #[error("{resource} cannot be updated in place: {message}")]
    DriftNotRepairable { resource: String, message: String },

    /// Any other provider failure
    #[error("AWS request for {resource} failed: {source}")]
    Sdk {
        resource: String,
        #[source]
        source: BoxError,
    },
}

impl ReconcileError {
    /// Whether a lookup that failed with this error should be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::TransientLookup { .. } | ReconcileError::Conflict { .. }
        )
    }

    pub fn malformed(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::MalformedResponse {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn sdk(resource: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ReconcileError::Sdk {
            resource: resource.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        let transient = ReconcileError::TransientLookup {
            resource: "queue 'q'".into(),
            message: "throttled".into(),
        };
        let conflict = ReconcileError::Conflict {
            resource: "queue 'q'".into(),
            message: "exists".into(),
        };
        assert!(transient.is_retryable());
        assert!(conflict.is_retryable());
        assert!(!ReconcileError::malformed("queue 'q'", "no url").is_retryable());
        assert!(
            !ReconcileError::NotFound {
                resource: "queue 'q'".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_timeout_message_includes_last_error() {
        let err = ReconcileError::ReconciliationTimeout {
            resource: "queue 'q'".into(),
            attempts: 5,
            last_error: Some("throttled".into()),
        };
        assert_eq!(
            err.to_string(),
            "Reconciliation of queue 'q' timed out after 5 attempts (last error: throttled)"
        );

        let err = ReconcileError::ReconciliationTimeout {
            resource: "queue 'q'".into(),
            attempts: 3,
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "Reconciliation of queue 'q' timed out after 3 attempts"
        );
    }

    #[test]
    fn test_sdk_error_keeps_source() {
        let io = std::io::Error::other("connection reset");
        let err = ReconcileError::sdk("bucket 'b'", io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "connection reset");
    }
}
