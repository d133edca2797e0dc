//! Kinds of AWS resources reconciled by the provisioner

use std::fmt;

/// Types of AWS resources managed by renderfarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// S3 bucket that receives scene archives
    Bucket,
    /// SQS queue holding render jobs
    Queue,
    /// IAM role assumed by the launcher function
    ExecutionRole,
    /// Inline policy attached to an IAM role
    RolePolicy,
    /// Launcher Lambda function
    Function,
    /// Resource-policy statement allowing S3 to invoke the function
    FunctionPermission,
    /// Bucket notification configuration targeting the function
    BucketNotification,
    /// ECS task definition for the worker container
    TaskDefinition,
    /// Role of the first ECS container instance (discovered, never created)
    ContainerInstanceRole,
}

impl ResourceKind {
    /// Stable identifier used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Queue => "queue",
            ResourceKind::ExecutionRole => "execution-role",
            ResourceKind::RolePolicy => "role-policy",
            ResourceKind::Function => "function",
            ResourceKind::FunctionPermission => "function-permission",
            ResourceKind::BucketNotification => "bucket-notification",
            ResourceKind::TaskDefinition => "task-definition",
            ResourceKind::ContainerInstanceRole => "container-instance-role",
        }
    }

    /// Whether the provisioner can only look this resource up.
    pub fn is_read_only(self) -> bool {
        matches!(self, ResourceKind::ContainerInstanceRole)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
