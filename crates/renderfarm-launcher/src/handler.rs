//! Invocation handler

use crate::dispatch::JobDispatcher;
use crate::error::LauncherError;
use crate::event::object_refs;
use renderfarm_common::LauncherConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// What one invocation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The event was queued and a worker started
    Dispatched {
        keys: Vec<String>,
        message_id: String,
        task_arns: Vec<String>,
    },
    /// No key in the event passed the allowlist
    Skipped { rejected: Vec<String> },
}

/// Handle one S3 notification.
///
/// The whole event is forwarded as the message body so the worker sees
/// bucket and key exactly as S3 reported them. One task is started per
/// invocation regardless of how many keys were accepted.
pub async fn handle<D: JobDispatcher>(
    config: &LauncherConfig,
    dispatcher: &D,
    event: &Value,
) -> Result<Outcome, LauncherError> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for object in object_refs(event)? {
        if config.accepts_key(&object.key) {
            accepted.push(object.key);
        } else {
            warn!(bucket = %object.bucket, key = %object.key, "Key does not match allowlist, skipping");
            rejected.push(object.key);
        }
    }

    if accepted.is_empty() {
        return Ok(Outcome::Skipped { rejected });
    }

    let body = serde_json::to_string(event)?;
    let message_id = dispatcher.enqueue(&config.queue_url, &body).await?;
    let task_arns = dispatcher
        .start_task(&config.cluster, &config.task_definition)
        .await?;

    info!(
        keys = ?accepted,
        message_id = %message_id,
        tasks = ?task_arns,
        "Render job dispatched"
    );

    Ok(Outcome::Dispatched {
        keys: accepted,
        message_id,
        task_arns,
    })
}
