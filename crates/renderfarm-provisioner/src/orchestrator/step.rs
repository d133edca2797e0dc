//! Orchestrator steps and the outputs they hand to later steps

use crate::reconcile::document::required_str;
use crate::reconcile::{
    Document, ReconcileError, ReconciliationResult, Reconciler, ResourceDriver, ResourceSpec,
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Final states of the steps run so far, keyed by step name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutputs {
    states: BTreeMap<String, Document>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step: impl Into<String>, state: Document) {
        self.states.insert(step.into(), state);
    }

    pub fn get(&self, step: &str) -> Option<&Document> {
        self.states.get(step)
    }

    /// String field `key` of the output of `step`.
    ///
    /// A missing step or field is a [`ReconcileError::MalformedResponse`]:
    /// either the plan is missing a dependency or the provider returned less
    /// than the driver promised.
    pub fn require_str(&self, step: &str, key: &str) -> Result<&str, ReconcileError> {
        let resource = format!("output of step '{step}'");
        let state = self
            .get(step)
            .ok_or_else(|| ReconcileError::malformed(&resource, "step has not run"))?;
        required_str(state, key, &resource)
    }
}

/// One unit of work in an orchestrated run.
///
/// Returns a boxed future so steps over different driver types can share a
/// list.
pub trait Step {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        reconciler: &'a Reconciler,
        outputs: &'a StepOutputs,
    ) -> LocalBoxFuture<'a, Result<ReconciliationResult, ReconcileError>>;
}

/// Reconciles one resource whose spec is built from earlier outputs.
pub struct ReconcileStep<D, F> {
    name: String,
    driver: D,
    build_spec: F,
    /// Pause after a create or update before the next step runs
    settle: Option<Duration>,
}

impl<D, F> ReconcileStep<D, F>
where
    D: ResourceDriver,
    F: Fn(&StepOutputs) -> Result<ResourceSpec, ReconcileError>,
{
    pub fn new(name: impl Into<String>, driver: D, build_spec: F) -> Self {
        Self {
            name: name.into(),
            driver,
            build_spec,
            settle: None,
        }
    }

    /// Wait `delay` after this step changed something.
    ///
    /// IAM changes are not immediately visible to other services.
    pub fn with_settle(mut self, delay: Duration) -> Self {
        self.settle = Some(delay);
        self
    }
}

impl<D, F> Step for ReconcileStep<D, F>
where
    D: ResourceDriver,
    F: Fn(&StepOutputs) -> Result<ResourceSpec, ReconcileError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        reconciler: &'a Reconciler,
        outputs: &'a StepOutputs,
    ) -> LocalBoxFuture<'a, Result<ReconciliationResult, ReconcileError>> {
        async move {
            let spec = (self.build_spec)(outputs)?;
            let result = reconciler.reconcile(&self.driver, spec).await?;

            if result.changed() {
                if let Some(delay) = self.settle {
                    info!(step = %self.name, delay_secs = delay.as_secs(), "Waiting for change to propagate");
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(result)
        }
        .boxed_local()
    }
}
