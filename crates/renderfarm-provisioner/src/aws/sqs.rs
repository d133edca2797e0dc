//! SQS queue driver

use crate::aws::error::SdkResultExt;
use crate::reconcile::document::required_str;
use crate::reconcile::{Document, ReconcileError, ResourceDriver};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::QueueAttributeName;
use renderfarm_common::tags;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info};

/// Queue identified by name.
///
/// Desired state: `{"QueueName", "Attributes": {name: value}}`. Found state
/// adds `QueueUrl`, `QueueArn` and every attribute SQS reports.
pub struct QueueDriver {
    client: Client,
    app_name: String,
}

/// Attributes as a name/value map, parsed from the desired document
fn desired_attributes(
    desired: &Document,
    resource: &str,
) -> Result<HashMap<QueueAttributeName, String>, ReconcileError> {
    let Some(attributes) = desired.get("Attributes") else {
        return Ok(HashMap::new());
    };
    let map = attributes
        .as_object()
        .ok_or_else(|| ReconcileError::malformed(resource, "Attributes is not an object"))?;
    map.iter()
        .map(|(name, value)| {
            let value = value.as_str().ok_or_else(|| {
                ReconcileError::malformed(resource, format!("attribute {name} is not a string"))
            })?;
            Ok((QueueAttributeName::from(name.as_str()), value.to_string()))
        })
        .collect()
}

impl QueueDriver {
    pub fn new(client: Client, app_name: impl Into<String>) -> Self {
        Self {
            client,
            app_name: app_name.into(),
        }
    }

    async fn queue_url(&self, name: &str, resource: &str) -> Result<Option<String>, ReconcileError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .not_found_as_none(resource)?;
        match output {
            None => Ok(None),
            Some(output) => output
                .queue_url()
                .map(|url| Some(url.to_string()))
                .ok_or_else(|| ReconcileError::malformed(resource, "GetQueueUrl returned no URL")),
        }
    }
}

impl ResourceDriver for QueueDriver {
    async fn find(&self, name: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("queue '{name}'");
        let Some(url) = self.queue_url(name, &resource).await? else {
            return Ok(None);
        };

        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .not_found_as_none(&resource)?;
        let Some(output) = output else {
            return Ok(None);
        };

        let mut attributes = Map::new();
        let mut arn = None;
        for (key, value) in output.attributes().into_iter().flatten() {
            if *key == QueueAttributeName::QueueArn {
                arn = Some(value.clone());
            }
            attributes.insert(key.as_str().to_string(), Value::String(value.clone()));
        }
        let arn = arn.ok_or_else(|| ReconcileError::malformed(&resource, "no QueueArn attribute"))?;

        debug!(queue = %name, url = %url, "Found queue");
        Ok(Some(json!({
            "QueueName": name,
            "QueueUrl": url,
            "QueueArn": arn,
            "Attributes": attributes,
        })))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let name = required_str(desired, "QueueName", "queue")?;
        let resource = format!("queue '{name}'");
        let attributes = desired_attributes(desired, &resource)?;

        info!(queue = %name, "Creating queue");
        let mut request = self
            .client
            .create_queue()
            .queue_name(name)
            .set_attributes(Some(attributes));
        for (key, value) in tags::standard_tags(&self.app_name) {
            request = request.tags(key, value);
        }
        let output = request.send().await.or_reconcile_error(&resource)?;
        let url = output
            .queue_url()
            .ok_or_else(|| ReconcileError::malformed(&resource, "CreateQueue returned no URL"))?;

        Ok(json!({"QueueName": name, "QueueUrl": url}))
    }

    async fn update(&self, name: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let resource = format!("queue '{name}'");
        let attributes = desired_attributes(desired, &resource)?;
        let url = self
            .queue_url(name, &resource)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                resource: resource.clone(),
            })?;

        info!(queue = %name, attributes = attributes.len(), "Updating queue attributes");
        self.client
            .set_queue_attributes()
            .queue_url(&url)
            .set_attributes(Some(attributes))
            .send()
            .await
            .or_reconcile_error(&resource)?;

        self.find(name)
            .await?
            .ok_or(ReconcileError::NotFound { resource })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_attributes() {
        let desired = json!({
            "QueueName": "q",
            "Attributes": {"VisibilityTimeout": "30", "MessageRetentionPeriod": "345600"}
        });
        let attributes = desired_attributes(&desired, "queue 'q'").unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(
            attributes.get(&QueueAttributeName::VisibilityTimeout).map(String::as_str),
            Some("30")
        );
    }

    #[test]
    fn test_missing_attributes_is_empty() {
        let attributes = desired_attributes(&json!({"QueueName": "q"}), "queue 'q'").unwrap();
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_non_string_attribute_is_malformed() {
        let desired = json!({"Attributes": {"VisibilityTimeout": 30}});
        let err = desired_attributes(&desired, "queue 'q'").unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedResponse { .. }));
    }
}
