//! Job dispatch: SQS message plus ECS task

use crate::error::LauncherError;
use aws_config::SdkConfig;
use tracing::debug;

/// Sends render jobs and starts workers.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait JobDispatcher: Send + Sync {
    /// Send a message body to the job queue, returning the message id
    async fn enqueue(&self, queue_url: &str, body: &str) -> Result<String, LauncherError>;

    /// Start one task, returning the ARNs ECS reports
    async fn start_task(
        &self,
        cluster: &str,
        task_definition: &str,
    ) -> Result<Vec<String>, LauncherError>;
}

/// Dispatcher backed by the AWS SDK
pub struct AwsDispatcher {
    sqs: aws_sdk_sqs::Client,
    ecs: aws_sdk_ecs::Client,
}

impl AwsDispatcher {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            sqs: aws_sdk_sqs::Client::new(config),
            ecs: aws_sdk_ecs::Client::new(config),
        }
    }
}

impl JobDispatcher for AwsDispatcher {
    async fn enqueue(&self, queue_url: &str, body: &str) -> Result<String, LauncherError> {
        let output = self
            .sqs
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| LauncherError::Enqueue {
                queue_url: queue_url.to_string(),
                source: Box::new(e),
            })?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        debug!(queue_url, message_id = %message_id, "Message sent");
        Ok(message_id)
    }

    async fn start_task(
        &self,
        cluster: &str,
        task_definition: &str,
    ) -> Result<Vec<String>, LauncherError> {
        let output = self
            .ecs
            .run_task()
            .cluster(cluster)
            .task_definition(task_definition)
            .count(1)
            .send()
            .await
            .map_err(|e| LauncherError::StartTask {
                task_definition: task_definition.to_string(),
                source: Box::new(e),
            })?;

        let task_arns: Vec<String> = output
            .tasks()
            .iter()
            .filter_map(|task| task.task_arn().map(String::from))
            .collect();

        if task_arns.is_empty() && !output.failures().is_empty() {
            let reasons = output
                .failures()
                .iter()
                .map(|f| f.reason().unwrap_or("unknown"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(LauncherError::TaskNotPlaced {
                task_definition: task_definition.to_string(),
                reasons,
            });
        }

        debug!(cluster, task_definition, tasks = task_arns.len(), "Task started");
        Ok(task_arns)
    }
}
