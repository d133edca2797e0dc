//! S3 bucket and bucket notification drivers

use crate::aws::error::SdkResultExt;
use crate::reconcile::document::required_str;
use crate::reconcile::{Document, ReconcileError, ResourceDriver};
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::get_bucket_notification_configuration::GetBucketNotificationConfigurationOutput;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Event, LambdaFunctionConfiguration,
    NotificationConfiguration, Tag, Tagging,
};
use renderfarm_common::tags;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Region S3 reports (as an empty location) for the classic endpoint
const US_EAST_1: &str = "us-east-1";

/// Map a `GetBucketLocation` constraint onto a region name.
fn region_from_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => US_EAST_1.to_string(),
        // Legacy alias for eu-west-1
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

fn bucket_state(bucket: &str, region: &str) -> Document {
    json!({
        "Bucket": bucket,
        "Region": region,
        "Arn": format!("arn:aws:s3:::{bucket}"),
    })
}

/// Bucket identified by name. Desired state: `{"Bucket", "Region"}`.
pub struct BucketDriver {
    client: Client,
    app_name: String,
}

impl BucketDriver {
    pub fn new(client: Client, app_name: impl Into<String>) -> Self {
        Self {
            client,
            app_name: app_name.into(),
        }
    }

    fn tagging(&self) -> Result<Tagging, ReconcileError> {
        let tag_set = tags::standard_tags(&self.app_name)
            .into_iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ReconcileError::sdk("bucket tags", e))?;
        Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| ReconcileError::sdk("bucket tags", e))
    }
}

impl ResourceDriver for BucketDriver {
    async fn find(&self, bucket: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("bucket '{bucket}'");

        let Some(location) = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };

        let region = region_from_location(location.location_constraint().map(|c| c.as_str()));
        debug!(bucket = %bucket, region = %region, "Found bucket");
        Ok(Some(bucket_state(bucket, &region)))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let bucket = required_str(desired, "Bucket", "bucket")?;
        let region = required_str(desired, "Region", "bucket")?;
        let resource = format!("bucket '{bucket}'");

        info!(bucket = %bucket, region = %region, "Creating bucket");
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if region != US_EAST_1 {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.or_reconcile_error(&resource)?;

        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(self.tagging()?)
            .send()
            .await
            .or_reconcile_error(&resource)?;

        Ok(bucket_state(bucket, region))
    }

    async fn update(&self, bucket: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let region = required_str(desired, "Region", "bucket")?;
        Err(ReconcileError::DriftNotRepairable {
            resource: format!("bucket '{bucket}'"),
            message: format!(
                "bucket exists in another region than {region}; delete it or choose another --bucket"
            ),
        })
    }
}

/// One Lambda target of a bucket notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LambdaTarget {
    id: String,
    lambda_function_arn: String,
    events: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NotificationDocument {
    bucket: String,
    #[serde(default)]
    lambda_function_configurations: Vec<LambdaTarget>,
}

impl NotificationDocument {
    fn from_sdk(bucket: &str, configs: &[LambdaFunctionConfiguration]) -> Self {
        let lambda_function_configurations = configs
            .iter()
            .map(|c| {
                let mut events: Vec<String> =
                    c.events().iter().map(|e| e.as_str().to_string()).collect();
                events.sort();
                LambdaTarget {
                    id: c.id().unwrap_or_default().to_string(),
                    lambda_function_arn: c.lambda_function_arn().to_string(),
                    events,
                }
            })
            .collect();
        Self {
            bucket: bucket.to_string(),
            lambda_function_configurations,
        }
    }

    /// Build the configuration to put, carrying over the queue, topic and
    /// EventBridge targets already on the bucket.
    fn to_sdk(
        &self,
        current: &GetBucketNotificationConfigurationOutput,
    ) -> Result<NotificationConfiguration, ReconcileError> {
        let configs = self
            .lambda_function_configurations
            .iter()
            .map(|target| {
                LambdaFunctionConfiguration::builder()
                    .id(&target.id)
                    .lambda_function_arn(&target.lambda_function_arn)
                    .set_events(Some(
                        target.events.iter().map(|e| Event::from(e.as_str())).collect(),
                    ))
                    .build()
                    .map_err(|e| ReconcileError::sdk("bucket notification", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NotificationConfiguration::builder()
            .set_lambda_function_configurations(Some(configs))
            .set_queue_configurations(Some(current.queue_configurations().to_vec()))
            .set_topic_configurations(Some(current.topic_configurations().to_vec()))
            .set_event_bridge_configuration(current.event_bridge_configuration().cloned())
            .build())
    }

    fn to_document(&self) -> Result<Document, ReconcileError> {
        serde_json::to_value(self)
            .map_err(|e| ReconcileError::malformed("bucket notification", e.to_string()))
    }
}

/// Notification configuration of a bucket, identified by bucket name.
///
/// Desired state: `{"Bucket", "LambdaFunctionConfigurations"}`. Only Lambda
/// targets are managed: `update` replaces them and keeps any queue, topic or
/// EventBridge targets already configured.
pub struct NotificationDriver {
    client: Client,
}

impl NotificationDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn put(&self, bucket: &str, desired: &Document) -> Result<Document, ReconcileError> {
        let resource = format!("bucket notification '{bucket}'");
        let mut parsed: NotificationDocument = serde_json::from_value(desired.clone())
            .map_err(|e| ReconcileError::malformed(&resource, e.to_string()))?;
        parsed.bucket = bucket.to_string();

        let current = self
            .client
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .or_reconcile_error(&resource)?;

        info!(
            bucket = %bucket,
            targets = parsed.lambda_function_configurations.len(),
            "Putting bucket notification configuration"
        );
        self.client
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(parsed.to_sdk(&current)?)
            .send()
            .await
            .or_reconcile_error(&resource)?;

        parsed.to_document()
    }
}

impl ResourceDriver for NotificationDriver {
    async fn find(&self, bucket: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("bucket notification '{bucket}'");
        let Some(output) = self
            .client
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };

        let configs = output.lambda_function_configurations();
        if configs.is_empty() {
            return Ok(None);
        }
        NotificationDocument::from_sdk(bucket, configs)
            .to_document()
            .map(Some)
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let bucket = required_str(desired, "Bucket", "bucket notification")?;
        self.put(bucket, desired).await
    }

    async fn update(&self, bucket: &str, desired: &Document) -> Result<Document, ReconcileError> {
        self.put(bucket, desired).await
    }
}
