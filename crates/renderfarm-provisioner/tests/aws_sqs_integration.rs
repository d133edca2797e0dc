//! SQS integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and only run with:
//! ```
//! AWS_PROFILE=your_profile cargo test --test aws_sqs_integration -- --ignored
//! ```

use renderfarm_common::ResourceKind;
use renderfarm_provisioner::aws::{AwsContext, QueueDriver};
use renderfarm_provisioner::reconcile::{Reconciler, ResourceDriver, ResourceSpec};
use renderfarm_provisioner::wait::RetryPolicy;
use renderfarm_test_utils::{get_test_region, test_resource_name};
use serde_json::json;
use std::time::Duration;

/// Create, re-run, drift and repair a real queue, then delete it.
#[tokio::test]
#[ignore]
async fn test_queue_reconcile_lifecycle() {
    let ctx = AwsContext::new(&get_test_region()).await;
    let driver = QueueDriver::new(ctx.sqs_client(), "renderfarm-test");
    let reconciler = Reconciler::new(RetryPolicy::new(10, Duration::from_secs(2)));

    let name = test_resource_name("queue");
    let desired = json!({
        "QueueName": name,
        "Attributes": {"VisibilityTimeout": "30", "MessageRetentionPeriod": "345600"},
    });
    let spec = || ResourceSpec::new(ResourceKind::Queue, &name, desired.clone());

    let first = reconciler
        .reconcile(&driver, spec())
        .await
        .expect("Should create queue");
    assert!(first.created, "First run should create the queue");
    let url = first.final_state["QueueUrl"]
        .as_str()
        .expect("Found state should carry QueueUrl")
        .to_string();

    let second = reconciler
        .reconcile(&driver, spec())
        .await
        .expect("Second run should succeed");
    assert!(!second.changed(), "Second run should be a no-op");

    // Drift the queue out of band
    ctx.sqs_client()
        .set_queue_attributes()
        .queue_url(&url)
        .attributes(aws_sdk_sqs::types::QueueAttributeName::VisibilityTimeout, "120")
        .send()
        .await
        .expect("Should change visibility timeout");

    let repaired = reconciler
        .reconcile(&driver, spec())
        .await
        .expect("Drift should be repaired");
    assert!(repaired.updated, "Drifted queue should be updated");
    assert_eq!(repaired.final_state["Attributes"]["VisibilityTimeout"], "30");

    ctx.sqs_client()
        .delete_queue()
        .queue_url(&url)
        .send()
        .await
        .expect("Should delete queue");
}

#[tokio::test]
#[ignore]
async fn test_missing_queue_is_none() {
    let ctx = AwsContext::new(&get_test_region()).await;
    let driver = QueueDriver::new(ctx.sqs_client(), "renderfarm-test");

    let found = driver
        .find(&test_resource_name("missing"))
        .await
        .expect("Lookup of a missing queue should not fail");
    assert!(found.is_none());
}
