//! AWS drivers for the render pipeline
//!
//! One [`ResourceDriver`](crate::reconcile::ResourceDriver) per resource
//! kind:
//! - S3: bucket and bucket notification
//! - SQS: job queue
//! - IAM: execution role and inline role policies
//! - Lambda: launcher function and its invoke permission
//! - ECS: task definition and container-instance role discovery
//! - STS: account ID lookup

pub mod account;
pub mod context;
pub mod ecs;
pub mod error;
pub mod iam;
pub mod lambda;
pub mod s3;
pub mod sqs;

pub use account::{AccountId, get_current_account_id};
pub use context::AwsContext;

// Drivers
pub use ecs::{ContainerInstanceRoleDriver, TaskDefinitionDriver};
pub use iam::{RoleDriver, RolePolicyDriver};
pub use lambda::{FunctionDriver, PermissionDriver};
pub use s3::{BucketDriver, NotificationDriver};
pub use sqs::QueueDriver;

// Error handling
pub use error::{AwsError, SdkResultExt, classify_aws_error, classify_sdk_error};
