//! Desired-state documents for every pipeline resource
//!
//! Each builder returns the JSON document a driver compares against what it
//! finds. Field names follow the AWS API spelling.

use crate::config::PipelineConfig;
use crate::reconcile::Document;
use renderfarm_common::defaults::LAUNCHER_CONFIG_ENV;
use serde_json::json;

/// Lambda runtime for a custom `bootstrap` binary
pub const FUNCTION_RUNTIME: &str = "provided.al2023";
pub const FUNCTION_HANDLER: &str = "bootstrap";
pub const FUNCTION_TIMEOUT_SECS: i32 = 30;
pub const FUNCTION_MEMORY_MIB: i32 = 128;

/// Bucket event that triggers the launcher
pub const OBJECT_CREATED_EVENT: &str = "s3:ObjectCreated:*";

const POLICY_VERSION: &str = "2012-10-17";

pub fn bucket(config: &PipelineConfig) -> Document {
    json!({
        "Bucket": config.bucket,
        "Region": config.aws.region,
    })
}

/// Queue attributes are pinned to the SQS defaults so manual edits are
/// reverted.
pub fn queue(config: &PipelineConfig) -> Document {
    json!({
        "QueueName": config.queue_name(),
        "Attributes": {
            "VisibilityTimeout": "30",
            "MessageRetentionPeriod": "345600",
        },
    })
}

/// Trust policy allowing Lambda to assume the execution role
pub fn lambda_trust_policy() -> Document {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Sid": "",
                "Effect": "Allow",
                "Principal": {"Service": "lambda.amazonaws.com"},
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

pub fn execution_role(config: &PipelineConfig) -> Document {
    json!({
        "RoleName": config.execution_role_name(),
        "AssumeRolePolicyDocument": lambda_trust_policy(),
    })
}

/// Inline policy for the launcher: write logs, enqueue jobs, start tasks.
pub fn execution_policy() -> Document {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["logs:*", "sqs:SendMessage", "ecs:RunTask"],
                "Resource": [
                    "arn:aws:logs:*:*:*",
                    "arn:aws:sqs:*:*:*",
                    "arn:aws:ecs:*:*:*"
                ]
            }
        ]
    })
}

/// Inline policy giving the container instances access to the bucket
pub fn bucket_access_policy(bucket: &str) -> Document {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["s3:ListAllMyBuckets"],
                "Resource": "arn:aws:s3:::*"
            },
            {
                "Effect": "Allow",
                "Action": ["s3:ListBucket", "s3:GetBucketLocation"],
                "Resource": format!("arn:aws:s3:::{bucket}")
            },
            {
                "Effect": "Allow",
                "Action": ["s3:PutObject", "s3:GetObject", "s3:DeleteObject"],
                "Resource": format!("arn:aws:s3:::{bucket}/*")
            }
        ]
    })
}

pub fn role_policy(role_name: &str, policy_name: &str, policy: Document) -> Document {
    json!({
        "RoleName": role_name,
        "PolicyName": policy_name,
        "PolicyDocument": policy,
    })
}

/// Launcher function configuration. `launcher_config` is the serialized
/// [`renderfarm_common::LauncherConfig`].
pub fn function(
    config: &PipelineConfig,
    role_arn: &str,
    code_sha256: &str,
    launcher_config: &str,
) -> Document {
    json!({
        "FunctionName": config.function_name(),
        "Runtime": FUNCTION_RUNTIME,
        "Handler": FUNCTION_HANDLER,
        "Role": role_arn,
        "CodeSha256": code_sha256,
        "Timeout": FUNCTION_TIMEOUT_SECS,
        "MemorySize": FUNCTION_MEMORY_MIB,
        "Environment": {
            "Variables": {
                (LAUNCHER_CONFIG_ENV): launcher_config,
            }
        },
    })
}

/// Permission statement letting the bucket invoke the function
pub fn function_permission(config: &PipelineConfig, source_account: &str) -> Document {
    json!({
        "StatementId": config.permission_statement_id(),
        "Action": "lambda:InvokeFunction",
        "Principal": "s3.amazonaws.com",
        "SourceArn": config.bucket_arn(),
        "SourceAccount": source_account,
    })
}

pub fn bucket_notification(config: &PipelineConfig, function_arn: &str) -> Document {
    json!({
        "Bucket": config.bucket,
        "LambdaFunctionConfigurations": [
            {
                "Id": config.notification_id(),
                "LambdaFunctionArn": function_arn,
                "Events": [OBJECT_CREATED_EVENT],
            }
        ]
    })
}

/// Worker task definition. The environment is sorted by name, matching the
/// order the ECS driver reports it in.
pub fn task_definition(config: &PipelineConfig, image: &str, queue_url: &str) -> Document {
    json!({
        "Family": config.task_family(),
        "ContainerDefinitions": [
            {
                "Name": config.container_name(),
                "Image": image,
                "Cpu": config.worker.cpu,
                "Memory": config.worker.memory,
                "Essential": true,
                "Environment": [
                    {"Name": "AWS_REGION", "Value": config.aws.region},
                    {"Name": "SQS_QUEUE_URL", "Value": queue_url},
                ],
            }
        ]
    })
}

pub fn container_instance_role(config: &PipelineConfig) -> Document {
    json!({ "Cluster": config.cluster })
}

/// Parse a policy document as returned by IAM (URL-encoded JSON) or Lambda
/// (plain JSON).
pub fn parse_policy_document(raw: &str) -> Result<Document, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(doc) => Ok(doc),
        Err(plain_err) => match urlencoding::decode(raw) {
            Ok(decoded) => serde_json::from_str(&decoded),
            Err(_) => Err(plain_err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{canonical_json, documents_match};

    fn config() -> PipelineConfig {
        PipelineConfig {
            app_name: "App".to_string(),
            bucket: "alice-pov-ray-bucket".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bucket_access_policy_scopes_bucket() {
        let policy = bucket_access_policy("alice-pov-ray-bucket");
        let statements = policy["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[1]["Resource"], "arn:aws:s3:::alice-pov-ray-bucket");
        assert_eq!(statements[2]["Resource"], "arn:aws:s3:::alice-pov-ray-bucket/*");
    }

    #[test]
    fn test_task_definition_environment() {
        let mut config = config();
        config.aws.region = "eu-west-1".to_string();
        let doc = task_definition(&config, "me/worker:latest", "https://sqs/q");
        let container = &doc["ContainerDefinitions"][0];
        assert_eq!(doc["Family"], "AppTask");
        assert_eq!(container["Name"], "App");
        assert_eq!(container["Cpu"], 512);
        assert_eq!(container["Environment"][0]["Value"], "eu-west-1");
        assert_eq!(container["Environment"][1]["Name"], "SQS_QUEUE_URL");
        assert_eq!(container["Environment"][1]["Value"], "https://sqs/q");
    }

    #[test]
    fn test_function_carries_launcher_config() {
        let doc = function(&config(), "arn:role", "abc=", r#"{"queue_url":"u"}"#);
        assert_eq!(doc["Runtime"], FUNCTION_RUNTIME);
        assert_eq!(
            doc["Environment"]["Variables"][LAUNCHER_CONFIG_ENV],
            r#"{"queue_url":"u"}"#
        );
    }

    #[test]
    fn test_notification_targets_function() {
        let doc = bucket_notification(&config(), "arn:aws:lambda:us-east-1:1:function:f");
        let entry = &doc["LambdaFunctionConfigurations"][0];
        assert_eq!(entry["Id"], "App");
        assert_eq!(entry["Events"][0], OBJECT_CREATED_EVENT);
    }

    #[test]
    fn test_parse_url_encoded_policy() {
        let encoded = urlencoding::encode(&lambda_trust_policy().to_string()).into_owned();
        let parsed = parse_policy_document(&encoded).unwrap();
        assert!(documents_match(&parsed, &lambda_trust_policy()));
    }

    #[test]
    fn test_parse_plain_policy() {
        let parsed = parse_policy_document(&canonical_json(&execution_policy())).unwrap();
        assert!(documents_match(&parsed, &execution_policy()));
        assert!(parse_policy_document("not json").is_err());
    }
}
