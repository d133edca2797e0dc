//! Lambda function and invoke permission drivers

use crate::aws::error::SdkResultExt;
use crate::package::FunctionPackage;
use crate::policy::parse_policy_document;
use crate::reconcile::document::required_str;
use crate::reconcile::{Document, ReconcileError, ResourceDriver};
use crate::wait::{RetryPolicy, poll_until};
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, LastUpdateStatus, Runtime};
use renderfarm_common::tags;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info};

/// Configuration fields of a function, as declared in its desired document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionSettings {
    function_name: String,
    runtime: String,
    handler: String,
    role: String,
    timeout: i32,
    memory_size: i32,
    #[serde(default)]
    environment: EnvironmentSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentSettings {
    #[serde(default)]
    variables: HashMap<String, String>,
}

impl FunctionSettings {
    fn parse(desired: &Document) -> Result<Self, ReconcileError> {
        serde_json::from_value(desired.clone())
            .map_err(|e| ReconcileError::malformed("function", e.to_string()))
    }

    fn environment(&self) -> Environment {
        Environment::builder()
            .set_variables(Some(self.environment.variables.clone()))
            .build()
    }
}

/// Launcher function, identified by name.
///
/// Desired state carries `CodeSha256` of the package the driver was built
/// with; a different hash on the deployed function is drift.
pub struct FunctionDriver {
    client: Client,
    package: FunctionPackage,
    app_name: String,
    /// Polls `LastUpdateStatus` between code and configuration updates
    policy: RetryPolicy,
}

impl FunctionDriver {
    pub fn new(
        client: Client,
        package: FunctionPackage,
        app_name: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            package,
            app_name: app_name.into(),
            policy,
        }
    }

    /// Wait until an update to `name` is no longer in progress.
    async fn wait_updated(&self, name: &str, resource: &str) -> Result<(), ReconcileError> {
        let client = &self.client;
        poll_until(&self.policy, resource, move || async move {
            let output = client
                .get_function_configuration()
                .function_name(name)
                .send()
                .await
                .or_reconcile_error(resource)?;
            match output.last_update_status() {
                Some(LastUpdateStatus::InProgress) => Ok(None),
                Some(LastUpdateStatus::Failed) => Err(ReconcileError::sdk(
                    resource,
                    format!(
                        "function update failed: {}",
                        output.last_update_status_reason().unwrap_or("no reason given")
                    ),
                )),
                _ => Ok(Some(())),
            }
        })
        .await
    }
}

impl ResourceDriver for FunctionDriver {
    async fn find(&self, name: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("function '{name}'");
        let Some(output) = self
            .client
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };

        let variables: Map<String, Value> = output
            .environment()
            .and_then(|env| env.variables())
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        debug!(function = %name, code_sha256 = ?output.code_sha256(), "Found function");
        Ok(Some(json!({
            "FunctionName": output.function_name(),
            "FunctionArn": output.function_arn(),
            "Runtime": output.runtime().map(|r| r.as_str()),
            "Handler": output.handler(),
            "Role": output.role(),
            "CodeSha256": output.code_sha256(),
            "Timeout": output.timeout(),
            "MemorySize": output.memory_size(),
            "Environment": {"Variables": variables},
        })))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let settings = FunctionSettings::parse(desired)?;
        let resource = format!("function '{}'", settings.function_name);

        info!(
            function = %settings.function_name,
            code_sha256 = %self.package.code_sha256(),
            "Creating function"
        );
        let mut request = self
            .client
            .create_function()
            .function_name(&settings.function_name)
            .runtime(Runtime::from(settings.runtime.as_str()))
            .handler(&settings.handler)
            .role(&settings.role)
            .timeout(settings.timeout)
            .memory_size(settings.memory_size)
            .environment(settings.environment())
            .code(
                FunctionCode::builder()
                    .zip_file(Blob::new(self.package.bytes().to_vec()))
                    .build(),
            );
        for (key, value) in tags::standard_tags(&self.app_name) {
            request = request.tags(key, value);
        }
        let output = request.send().await.or_reconcile_error(&resource)?;

        Ok(json!({
            "FunctionName": output.function_name(),
            "FunctionArn": output.function_arn(),
            "CodeSha256": output.code_sha256(),
        }))
    }

    async fn update(&self, name: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let settings = FunctionSettings::parse(desired)?;
        let resource = format!("function '{name}'");

        info!(function = %name, code_sha256 = %self.package.code_sha256(), "Updating function code");
        self.client
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(self.package.bytes().to_vec()))
            .send()
            .await
            .or_reconcile_error(&resource)?;
        self.wait_updated(name, &resource).await?;

        info!(function = %name, "Updating function configuration");
        self.client
            .update_function_configuration()
            .function_name(name)
            .runtime(Runtime::from(settings.runtime.as_str()))
            .handler(&settings.handler)
            .role(&settings.role)
            .timeout(settings.timeout)
            .memory_size(settings.memory_size)
            .environment(settings.environment())
            .send()
            .await
            .or_reconcile_error(&resource)?;
        self.wait_updated(name, &resource).await?;

        self.find(name)
            .await?
            .ok_or(ReconcileError::NotFound { resource })
    }
}

/// ARN of an existing function, without needing a package.
pub async fn function_arn(client: &Client, name: &str) -> Result<Option<String>, ReconcileError> {
    let resource = format!("function '{name}'");
    let output = client
        .get_function_configuration()
        .function_name(name)
        .send()
        .await
        .not_found_as_none(&resource)?;
    Ok(output.and_then(|o| o.function_arn().map(str::to_string)))
}

/// Flatten a resource-policy statement into the shape of an `AddPermission`
/// request.
fn statement_to_permission(statement: &Value) -> Document {
    let principal = match &statement["Principal"] {
        Value::Object(p) => p.get("Service").cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    let condition = &statement["Condition"];
    json!({
        "StatementId": statement["Sid"],
        "Action": statement["Action"],
        "Principal": principal,
        "SourceArn": condition["ArnLike"]["AWS:SourceArn"],
        "SourceAccount": condition["StringEquals"]["AWS:SourceAccount"],
    })
}

/// One statement in a function's resource policy, identified by statement
/// ID.
///
/// Desired state: `{"StatementId", "Action", "Principal", "SourceArn",
/// "SourceAccount"}`. Statements cannot be edited, so `update` removes and
/// re-adds.
pub struct PermissionDriver {
    client: Client,
    function_name: String,
}

impl PermissionDriver {
    pub fn new(client: Client, function_name: impl Into<String>) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }

    async fn add(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let sid = required_str(desired, "StatementId", "permission")?;
        let resource = format!("permission '{sid}'");
        let mut request = self
            .client
            .add_permission()
            .function_name(&self.function_name)
            .statement_id(sid)
            .action(required_str(desired, "Action", &resource)?)
            .principal(required_str(desired, "Principal", &resource)?)
            .source_arn(required_str(desired, "SourceArn", &resource)?);
        if let Some(account) = desired.get("SourceAccount").and_then(Value::as_str) {
            request = request.source_account(account);
        }

        info!(function = %self.function_name, statement_id = %sid, "Adding invoke permission");
        let output = request.send().await.or_reconcile_error(&resource)?;
        match output.statement() {
            Some(raw) => {
                let statement = parse_policy_document(raw)
                    .map_err(|e| ReconcileError::malformed(&resource, e.to_string()))?;
                Ok(statement_to_permission(&statement))
            }
            None => Ok(desired.clone()),
        }
    }
}

impl ResourceDriver for PermissionDriver {
    async fn find(&self, sid: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("permission '{sid}'");
        let Some(output) = self
            .client
            .get_policy()
            .function_name(&self.function_name)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };
        let Some(raw) = output.policy() else {
            return Ok(None);
        };

        let policy = parse_policy_document(raw)
            .map_err(|e| ReconcileError::malformed(&resource, e.to_string()))?;
        let statement = policy["Statement"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|s| s["Sid"] == sid);
        Ok(statement.map(statement_to_permission))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        self.add(desired).await
    }

    async fn update(&self, sid: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let resource = format!("permission '{sid}'");
        info!(function = %self.function_name, statement_id = %sid, "Replacing invoke permission");
        self.client
            .remove_permission()
            .function_name(&self.function_name)
            .statement_id(sid)
            .send()
            .await
            .or_reconcile_error(&resource)?;
        self.add(desired).await
    }
}
