//! Configuration types for the provisioner
//!
//! The CLI builds one [`PipelineConfig`]; every resource name the pipeline
//! touches is derived from it.

use crate::wait::RetryPolicy;
use renderfarm_common::LauncherConfig;
use renderfarm_common::defaults::{
    BUCKET_SUFFIX, DEFAULT_APP_NAME, DEFAULT_CLUSTER, DEFAULT_CPU_SHARES, DEFAULT_KEY_SUFFIX,
    DEFAULT_MEMORY_MIB, DEFAULT_REGION, FUNCTION_NAME,
};
use std::path::PathBuf;

/// AWS account and region settings
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    /// Named profile; `None` uses the default credential chain
    pub profile: Option<String>,
}

/// Worker container settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Container image, required by the task definition step
    pub image: Option<String>,
    pub cpu: i32,
    pub memory: i32,
}

/// Everything one provisioning pass needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Prefix for derived resource names
    pub app_name: String,
    pub aws: AwsConfig,
    pub bucket: String,
    pub cluster: String,
    pub worker: WorkerConfig,
    /// Prebuilt launcher binary, required by the function step
    pub launcher_binary: Option<PathBuf>,
    /// Object key suffixes that start a render job
    pub key_suffixes: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            aws: AwsConfig {
                region: DEFAULT_REGION.to_string(),
                profile: None,
            },
            bucket: default_bucket_name(),
            cluster: DEFAULT_CLUSTER.to_string(),
            worker: WorkerConfig {
                image: None,
                cpu: DEFAULT_CPU_SHARES,
                memory: DEFAULT_MEMORY_MIB,
            },
            launcher_binary: None,
            key_suffixes: vec![DEFAULT_KEY_SUFFIX.to_string()],
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn queue_name(&self) -> String {
        format!("{}Queue", self.app_name)
    }

    pub fn task_family(&self) -> String {
        format!("{}Task", self.app_name)
    }

    /// Name of the single container in the task definition
    pub fn container_name(&self) -> &str {
        &self.app_name
    }

    pub fn execution_role_name(&self) -> String {
        format!("{}-Lambda-Execution-Role", self.app_name)
    }

    pub fn execution_policy_name(&self) -> &'static str {
        "AWSLambdaExecutionPolicy"
    }

    pub fn function_name(&self) -> &'static str {
        FUNCTION_NAME
    }

    /// Statement ID of the permission letting S3 invoke the function
    pub fn permission_statement_id(&self) -> String {
        format!("{}Permission", self.app_name)
    }

    /// Notification configuration ID on the bucket
    pub fn notification_id(&self) -> &str {
        &self.app_name
    }

    pub fn bucket_access_policy_name(&self) -> String {
        format!("{}BucketAccessPolicy", self.app_name)
    }

    pub fn bucket_arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.bucket)
    }

    /// Configuration handed to the launcher function
    pub fn launcher_config(&self, queue_url: &str) -> LauncherConfig {
        LauncherConfig {
            queue_url: queue_url.to_string(),
            task_definition: self.task_family(),
            cluster: self.cluster.clone(),
            key_suffix_allowlist: Some(self.key_suffixes.clone()),
        }
    }
}

/// `<user>-pov-ray-bucket`, where the user is taken from `$USER` or the
/// last component of `$HOME`.
pub fn default_bucket_name() -> String {
    let user = std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .and_then(|home| home.rsplit('/').find(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| "renderfarm".to_string());
    bucket_name_for_user(&user)
}

fn bucket_name_for_user(user: &str) -> String {
    format!("{}{}", user.to_lowercase(), BUCKET_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        let config = PipelineConfig {
            app_name: "ECSPOVRayWorker".to_string(),
            bucket: "alice-pov-ray-bucket".to_string(),
            ..Default::default()
        };
        assert_eq!(config.queue_name(), "ECSPOVRayWorkerQueue");
        assert_eq!(config.task_family(), "ECSPOVRayWorkerTask");
        assert_eq!(config.container_name(), "ECSPOVRayWorker");
        assert_eq!(
            config.execution_role_name(),
            "ECSPOVRayWorker-Lambda-Execution-Role"
        );
        assert_eq!(config.permission_statement_id(), "ECSPOVRayWorkerPermission");
        assert_eq!(
            config.bucket_access_policy_name(),
            "ECSPOVRayWorkerBucketAccessPolicy"
        );
        assert_eq!(config.function_name(), "ecs-worker-launcher");
        assert_eq!(config.bucket_arn(), "arn:aws:s3:::alice-pov-ray-bucket");
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.aws.region, "us-east-1");
        assert_eq!(config.cluster, "default");
        assert_eq!(config.worker.cpu, 512);
        assert_eq!(config.worker.memory, 512);
        assert_eq!(config.key_suffixes, vec![".zip".to_string()]);
        assert!(config.bucket.ends_with("-pov-ray-bucket"));
    }

    #[test]
    fn test_bucket_name_is_lowercase() {
        assert_eq!(bucket_name_for_user("Alice"), "alice-pov-ray-bucket");
    }
}
