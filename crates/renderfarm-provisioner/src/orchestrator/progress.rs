//! Progress reporting for orchestrated runs

use crate::reconcile::{ReconcileError, ReconciliationResult};
use tracing::{error, info};

/// Receives step lifecycle events.
///
/// Positions are 1-based.
pub trait ProgressReporter: Send + Sync {
    fn step_started(&self, position: usize, total: usize, name: &str);

    fn step_finished(&self, position: usize, total: usize, name: &str, result: &ReconciliationResult);

    fn step_failed(&self, position: usize, total: usize, name: &str, error: &ReconcileError);
}

/// Reports progress through `tracing`
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for LogReporter {
    fn step_started(&self, position: usize, total: usize, name: &str) {
        info!(step = %name, "[{position}/{total}] Reconciling");
    }

    fn step_finished(&self, position: usize, total: usize, name: &str, result: &ReconciliationResult) {
        info!(step = %name, action = result.action(), "[{position}/{total}] Done");
    }

    fn step_failed(&self, position: usize, total: usize, name: &str, error: &ReconcileError) {
        error!(step = %name, error = %error, "[{position}/{total}] Failed");
    }
}

/// Discards all events
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn step_started(&self, _: usize, _: usize, _: &str) {}

    fn step_finished(&self, _: usize, _: usize, _: &str, _: &ReconciliationResult) {}

    fn step_failed(&self, _: usize, _: usize, _: &str, _: &ReconcileError) {}
}
