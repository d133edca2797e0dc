//! AWS error classification
//!
//! SDK errors are classified by their service error code (via
//! `ProvideErrorMetadata`) and then mapped onto [`ReconcileError`], so the
//! reconciler can tell a missing resource from a throttled lookup.

use crate::reconcile::ReconcileError;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::error::Error as StdError;
use std::fmt::Debug;
use thiserror::Error;

/// AWS error categories
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AwsError {
    /// Resource does not exist
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists or a concurrent change collided
    #[error("Resource already exists or was changed concurrently: {message}")]
    Conflict { message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    Throttled,

    /// Service or network failure that may go away on its own
    #[error("Transient AWS failure: {message}")]
    Transient { message: String },

    /// Newly created IAM role not yet usable by another service
    #[error("IAM role not yet usable by the service (eventual consistency): {message}")]
    RolePropagationDelay { message: String },

    /// Response could not be parsed
    #[error("Unparseable AWS response: {message}")]
    Malformed { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AwsError::Conflict { .. })
    }

    /// Whether a read that failed with this error is worth repeating
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled | AwsError::Transient { .. } | AwsError::RolePropagationDelay { .. }
        )
    }

    /// A hint for the operator, for errors with a known remedy
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::RolePropagationDelay { .. } => {
                Some("IAM changes take a few seconds to propagate. Run the command again.")
            }
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }

    /// Map onto the reconciliation taxonomy.
    pub fn into_reconcile_error(self, resource: &str) -> ReconcileError {
        let resource = resource.to_string();
        match self {
            AwsError::NotFound { .. } => ReconcileError::NotFound { resource },
            AwsError::Conflict { message } => ReconcileError::Conflict { resource, message },
            AwsError::Throttled | AwsError::Transient { .. } => ReconcileError::TransientLookup {
                resource,
                message: self.to_string(),
            },
            AwsError::Malformed { message } => {
                ReconcileError::MalformedResponse { resource, message }
            }
            other => ReconcileError::Sdk {
                resource,
                source: Box::new(other),
            },
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "NoSuchBucket",
    "NoSuchEntity",
    "ResourceNotFoundException",
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    "ClusterNotFoundException",
];

/// Known AWS error codes for "already exists" or concurrent-change conditions
const CONFLICT_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "QueueAlreadyExists",
    "QueueNameExists",
    "ResourceConflictException",
    "OperationAborted",
    "ConcurrentModification",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "RequestThrottled",
];

/// Known AWS error codes for service-side failures
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "ServiceFailure",
    "ServerException",
    "RequestTimeout",
];

/// Classify an AWS error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        // ECS reports a missing task definition family as a client error
        Some("ClientException") if message.contains("Unable to describe task definition") => {
            AwsError::NotFound { message }
        }
        Some(c) if CONFLICT_CODES.contains(&c) => AwsError::Conflict { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if TRANSIENT_CODES.contains(&c) => AwsError::Transient { message },
        Some("InvalidParameterValueException") if message.contains("cannot be assumed") => {
            AwsError::RolePropagationDelay { message }
        }
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an SDK error from any service.
pub fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> AwsError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => AwsError::Transient {
            message: DisplayErrorContext(err).to_string(),
        },
        SdkError::ResponseError(_) => AwsError::Malformed {
            message: DisplayErrorContext(err).to_string(),
        },
        _ => {
            let meta = ProvideErrorMetadata::meta(err);
            classify_aws_error(meta.code(), meta.message())
        }
    }
}

/// Conversion of SDK results into reconciliation results
pub trait SdkResultExt<T> {
    /// Map any error onto [`ReconcileError`] for `resource`.
    fn or_reconcile_error(self, resource: &str) -> Result<T, ReconcileError>;

    /// Treat a "not found" error as `Ok(None)`.
    fn not_found_as_none(self, resource: &str) -> Result<Option<T>, ReconcileError>;
}

impl<T, E, R> SdkResultExt<T> for Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn or_reconcile_error(self, resource: &str) -> Result<T, ReconcileError> {
        self.map_err(|e| classify_sdk_error(&e).into_reconcile_error(resource))
    }

    fn not_found_as_none(self, resource: &str) -> Result<Option<T>, ReconcileError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let classified = classify_sdk_error(&e);
                if classified.is_not_found() {
                    Ok(None)
                } else {
                    Err(classified.into_reconcile_error(resource))
                }
            }
        }
    }
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AccessDenied",
        "The credentials in use lack permission for this call. Check --profile.",
    ),
    (
        "AccessDeniedException",
        "The credentials in use lack permission for this call. Check --profile.",
    ),
    (
        "BucketAlreadyExists",
        "Bucket names are global. Pick another name with --bucket.",
    ),
    (
        "InvalidClientTokenId",
        "The access key is not valid in this account or region.",
    ),
    (
        "ExpiredToken",
        "The session credentials have expired. Refresh them and retry.",
    ),
];

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn conflict_codes() {
        for code in CONFLICT_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_conflict(), "Expected Conflict for code: {code}");
        }
    }

    #[test]
    fn throttling_and_transient_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert_eq!(err, AwsError::Throttled);
            assert!(err.is_retryable());
        }
        for code in TRANSIENT_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(matches!(err, AwsError::Transient { .. }));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn missing_task_definition() {
        let err = classify_aws_error(
            Some("ClientException"),
            Some("Unable to describe task definition."),
        );
        assert!(err.is_not_found());

        let other = classify_aws_error(Some("ClientException"), Some("Container memory too low"));
        assert!(matches!(other, AwsError::Sdk { .. }));
    }

    #[test]
    fn role_propagation_delay() {
        let err = classify_aws_error(
            Some("InvalidParameterValueException"),
            Some("The role defined for the function cannot be assumed by Lambda."),
        );
        assert!(matches!(err, AwsError::RolePropagationDelay { .. }));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, AwsError::Sdk { .. }));

        let err2 = classify_aws_error(None, Some("something failed"));
        assert!(matches!(err2, AwsError::Sdk { code: None, .. }));
    }

    #[test]
    fn suggestions_for_known_codes() {
        for (code, _) in SUGGESTIONS {
            assert!(suggestion_for_code(code).is_some(), "No suggestion for {code}");
        }
        assert!(suggestion_for_code("SomeUnknownCode").is_none());
    }

    #[test]
    fn mapping_onto_reconcile_errors() {
        let resource = "queue 'q'";
        assert!(matches!(
            AwsError::Throttled.into_reconcile_error(resource),
            ReconcileError::TransientLookup { .. }
        ));
        assert!(matches!(
            AwsError::Conflict { message: "exists".into() }.into_reconcile_error(resource),
            ReconcileError::Conflict { .. }
        ));
        assert!(matches!(
            AwsError::NotFound { message: "gone".into() }.into_reconcile_error(resource),
            ReconcileError::NotFound { .. }
        ));
        assert!(matches!(
            AwsError::Malformed { message: "xml".into() }.into_reconcile_error(resource),
            ReconcileError::MalformedResponse { .. }
        ));

        let sdk = AwsError::Sdk {
            code: Some("AccessDenied".into()),
            message: "denied".into(),
        }
        .into_reconcile_error(resource);
        assert!(matches!(sdk, ReconcileError::Sdk { .. }));
        assert!(!sdk.is_retryable());
    }
}
