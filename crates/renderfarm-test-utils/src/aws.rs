//! AWS test utilities
//!
//! Integration tests create real resources; every name they use is unique
//! per run so parallel or aborted runs never collide.

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Get the AWS region for tests.
///
/// Checks `RENDERFARM_TEST_REGION`, then `AWS_REGION`, and falls back to
/// us-east-2.
pub fn get_test_region() -> String {
    std::env::var("RENDERFARM_TEST_REGION")
        .or_else(|_| std::env::var("AWS_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

/// Unique run ID of the form `test-{timestamp_ms}-{counter}`.
pub fn test_run_id() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{ts}-{counter}")
}

/// Unique resource name, e.g. `renderfarm-queue-test-1700000000000-0`.
///
/// Only characters valid in queue, role and bucket names are used.
pub fn test_resource_name(kind: &str) -> String {
    format!("renderfarm-{kind}-{}", test_run_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let run_id = test_run_id();
        let parts: Vec<&str> = run_id.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(test_run_id(), test_run_id());
    }

    #[test]
    fn test_resource_name_is_lowercase() {
        let name = test_resource_name("queue");
        assert!(name.starts_with("renderfarm-queue-test-"));
        assert_eq!(name, name.to_lowercase());
    }
}
