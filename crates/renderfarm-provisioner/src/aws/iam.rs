//! IAM role and inline policy drivers
//!
//! IAM returns policy documents URL-encoded; they are decoded and parsed
//! before comparison.

use crate::aws::error::SdkResultExt;
use crate::policy::parse_policy_document;
use crate::reconcile::document::required_str;
use crate::reconcile::{Document, ReconcileError, ResourceDriver, canonical_json};
use aws_sdk_iam::Client;
use aws_sdk_iam::types::Tag;
use renderfarm_common::tags;
use serde_json::json;
use tracing::{debug, info};

fn policy_from_iam(raw: &str, resource: &str) -> Result<Document, ReconcileError> {
    parse_policy_document(raw)
        .map_err(|e| ReconcileError::malformed(resource, format!("unparseable policy document: {e}")))
}

fn desired_policy(desired: &Document, key: &str, resource: &str) -> Result<String, ReconcileError> {
    desired
        .get(key)
        .map(canonical_json)
        .ok_or_else(|| ReconcileError::malformed(resource, format!("missing {key}")))
}

/// IAM role identified by name.
///
/// Desired state: `{"RoleName", "AssumeRolePolicyDocument"}`. Found state
/// adds `Arn`.
pub struct RoleDriver {
    client: Client,
    app_name: String,
}

impl RoleDriver {
    pub fn new(client: Client, app_name: impl Into<String>) -> Self {
        Self {
            client,
            app_name: app_name.into(),
        }
    }

    fn tags(&self) -> Result<Vec<Tag>, ReconcileError> {
        tags::standard_tags(&self.app_name)
            .into_iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| ReconcileError::sdk("role tags", e))
            })
            .collect()
    }
}

impl ResourceDriver for RoleDriver {
    async fn find(&self, role_name: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("role '{role_name}'");
        let Some(output) = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };
        let role = output
            .role()
            .ok_or_else(|| ReconcileError::malformed(&resource, "GetRole returned no role"))?;

        let trust = match role.assume_role_policy_document() {
            Some(raw) => policy_from_iam(raw, &resource)?,
            None => json!(null),
        };
        debug!(role = %role_name, arn = %role.arn(), "Found role");
        Ok(Some(json!({
            "RoleName": role.role_name(),
            "Arn": role.arn(),
            "AssumeRolePolicyDocument": trust,
        })))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let role_name = required_str(desired, "RoleName", "role")?;
        let resource = format!("role '{role_name}'");
        let trust = desired_policy(desired, "AssumeRolePolicyDocument", &resource)?;

        info!(role = %role_name, "Creating role");
        let output = self
            .client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust)
            .description(format!("Launcher execution role for {}", self.app_name))
            .set_tags(Some(self.tags()?))
            .send()
            .await
            .or_reconcile_error(&resource)?;
        let role = output
            .role()
            .ok_or_else(|| ReconcileError::malformed(&resource, "CreateRole returned no role"))?;

        Ok(json!({
            "RoleName": role.role_name(),
            "Arn": role.arn(),
            "AssumeRolePolicyDocument": desired["AssumeRolePolicyDocument"],
        }))
    }

    async fn update(&self, role_name: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let resource = format!("role '{role_name}'");
        let trust = desired_policy(desired, "AssumeRolePolicyDocument", &resource)?;

        info!(role = %role_name, "Updating assume role policy");
        self.client
            .update_assume_role_policy()
            .role_name(role_name)
            .policy_document(trust)
            .send()
            .await
            .or_reconcile_error(&resource)?;

        self.find(role_name)
            .await?
            .ok_or(ReconcileError::NotFound { resource })
    }
}

/// Inline role policy, identified by `role/policy`.
///
/// Desired state: `{"RoleName", "PolicyName", "PolicyDocument"}`.
/// `put_role_policy` replaces the document, so create and update are the
/// same call.
pub struct RolePolicyDriver {
    client: Client,
}

impl RolePolicyDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Identity key for `policy_name` attached to `role_name`
    pub fn identity(role_name: &str, policy_name: &str) -> String {
        format!("{role_name}/{policy_name}")
    }

    fn split_identity(identity: &str) -> Result<(&str, &str), ReconcileError> {
        identity.split_once('/').ok_or_else(|| {
            ReconcileError::malformed(
                format!("role policy '{identity}'"),
                "identity is not of the form role/policy",
            )
        })
    }

    async fn put(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let role_name = required_str(desired, "RoleName", "role policy")?;
        let policy_name = required_str(desired, "PolicyName", "role policy")?;
        let resource = format!("role policy '{}'", Self::identity(role_name, policy_name));
        let document = desired_policy(desired, "PolicyDocument", &resource)?;

        info!(role = %role_name, policy = %policy_name, "Putting inline role policy");
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .or_reconcile_error(&resource)?;

        Ok(desired.clone())
    }
}

impl ResourceDriver for RolePolicyDriver {
    async fn find(&self, identity: &str) -> Result<Option<Document>, ReconcileError> {
        let (role_name, policy_name) = Self::split_identity(identity)?;
        let resource = format!("role policy '{identity}'");
        let Some(output) = self
            .client
            .get_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };

        let document = policy_from_iam(output.policy_document(), &resource)?;
        Ok(Some(json!({
            "RoleName": output.role_name(),
            "PolicyName": output.policy_name(),
            "PolicyDocument": document,
        })))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        self.put(desired).await
    }

    async fn update(&self, _identity: &str, desired: &Document) -> Result<Document, ReconcileError> {
        self.put(desired).await
    }
}

/// First role of an instance profile.
pub async fn instance_profile_role(
    client: &Client,
    profile_name: &str,
) -> Result<Option<String>, ReconcileError> {
    let resource = format!("instance profile '{profile_name}'");
    let Some(output) = client
        .get_instance_profile()
        .instance_profile_name(profile_name)
        .send()
        .await
        .not_found_as_none(&resource)?
    else {
        return Ok(None);
    };
    Ok(output
        .instance_profile()
        .and_then(|profile| profile.roles().first())
        .map(|role| role.role_name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::lambda_trust_policy;
    use crate::reconcile::converged;

    #[test]
    fn test_identity_roundtrip() {
        let identity = RolePolicyDriver::identity("App-Lambda-Execution-Role", "AWSLambdaExecutionPolicy");
        assert_eq!(
            RolePolicyDriver::split_identity(&identity).unwrap(),
            ("App-Lambda-Execution-Role", "AWSLambdaExecutionPolicy")
        );
        assert!(RolePolicyDriver::split_identity("no-separator").is_err());
    }

    #[test]
    fn test_url_encoded_trust_policy_matches_desired() {
        // IAM returns the document percent-encoded with its own key order
        let stored = r#"{"Statement":[{"Action":"sts:AssumeRole","Effect":"Allow","Principal":{"Service":"lambda.amazonaws.com"},"Sid":""}],"Version":"2012-10-17"}"#;
        let encoded = urlencoding::encode(stored).into_owned();
        let found = json!({
            "RoleName": "r",
            "Arn": "arn:aws:iam::123456789012:role/r",
            "AssumeRolePolicyDocument": policy_from_iam(&encoded, "role 'r'").unwrap(),
        });
        let desired = json!({"RoleName": "r", "AssumeRolePolicyDocument": lambda_trust_policy()});
        assert!(converged(&found, &desired));
    }

    #[test]
    fn test_garbage_policy_is_malformed() {
        let err = policy_from_iam("%7Bnot json", "role 'r'").unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedResponse { .. }));
    }

    #[test]
    fn test_desired_policy_is_canonical() {
        let desired = json!({"PolicyDocument": {"Version": "2012-10-17", "Statement": []}});
        assert_eq!(
            desired_policy(&desired, "PolicyDocument", "p").unwrap(),
            r#"{"Statement":[],"Version":"2012-10-17"}"#
        );
        assert!(desired_policy(&desired, "Missing", "p").is_err());
    }
}
