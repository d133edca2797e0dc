//! Find-or-create-or-update for a single resource

use super::document::Document;
use super::driver::{ReconciliationResult, ResourceDriver, ResourceSpec};
use super::error::ReconcileError;
use crate::wait::{RetryPolicy, poll_until};
use tracing::{Instrument, debug, info, info_span, warn};

/// Drives one resource to its desired state through a [`ResourceDriver`].
///
/// Lookups are retried according to the policy because reads are eventually
/// consistent. Create and update are issued at most once each; a failed
/// mutation is returned to the caller unchanged.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    policy: RetryPolicy,
}

impl Reconciler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Reconcile `spec` and report what was done.
    ///
    /// - present and matching: no mutation
    /// - present and drifted: one `update`
    /// - absent: one `create`, then wait until `find` sees it
    ///
    /// A create that reports a conflict means the resource appeared
    /// concurrently; it is looked up again and converged, but `found` stays
    /// false because the first lookup saw nothing.
    ///
    /// Read-only kinds are never created or updated: absence is
    /// [`ReconcileError::NotFound`] and drift is
    /// [`ReconcileError::DriftNotRepairable`].
    pub async fn reconcile<D: ResourceDriver>(
        &self,
        driver: &D,
        spec: ResourceSpec,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let span = info_span!("reconcile", kind = %spec.kind, identity = %spec.identity_key);
        self.reconcile_inner(driver, &spec).instrument(span).await
    }

    async fn reconcile_inner<D: ResourceDriver>(
        &self,
        driver: &D,
        spec: &ResourceSpec,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let resource = spec.describe();
        let key = spec.identity_key.as_str();

        let existing = poll_until(&self.policy, &resource, move || async move {
            driver.find(key).await.map(Some)
        })
        .await?;

        let Some(existing) = existing else {
            if spec.kind.is_read_only() {
                return Err(ReconcileError::NotFound {
                    resource: format!("{resource} (discovered only, it must exist beforehand)"),
                });
            }
            info!(resource = %resource, "Creating");
            return match driver.create(&spec.desired_state).await {
                Ok(_) => {
                    let visible = self.wait_visible(driver, spec, &resource).await?;
                    Ok(ReconciliationResult::created(visible))
                }
                Err(e @ ReconcileError::Conflict { .. }) => {
                    warn!(resource = %resource, error = %e, "Create conflicted, looking up again");
                    let existing = self.wait_visible(driver, spec, &resource).await?;
                    let mut result = self.converge(driver, spec, &resource, existing).await?;
                    result.found = false;
                    Ok(result)
                }
                Err(e) => Err(e),
            };
        };

        self.converge(driver, spec, &resource, existing).await
    }

    async fn converge<D: ResourceDriver>(
        &self,
        driver: &D,
        spec: &ResourceSpec,
        resource: &str,
        existing: Document,
    ) -> Result<ReconciliationResult, ReconcileError> {
        if driver.compare(&existing, &spec.desired_state) {
            debug!(resource = %resource, "In sync");
            return Ok(ReconciliationResult::unchanged(existing));
        }

        if spec.kind.is_read_only() {
            return Err(ReconcileError::DriftNotRepairable {
                resource: resource.to_string(),
                message: "discovered resources are never modified".to_string(),
            });
        }

        info!(resource = %resource, "Drift detected, updating");
        let state = driver
            .update(&spec.identity_key, &spec.desired_state)
            .await?;
        Ok(ReconciliationResult::updated(state))
    }

    async fn wait_visible<D: ResourceDriver>(
        &self,
        driver: &D,
        spec: &ResourceSpec,
        resource: &str,
    ) -> Result<Document, ReconcileError> {
        let key = spec.identity_key.as_str();
        poll_until(&self.policy, resource, move || async move { driver.find(key).await }).await
    }
}
