//! Ordered, fail-fast execution of reconciliation steps
//!
//! Steps run one at a time in insertion order. Each sees the final states
//! of the steps before it. The first failure stops the run; nothing already
//! done is rolled back.

pub mod pipeline;
pub mod progress;
pub mod step;

pub use pipeline::{Stage, StepId, build_pipeline, plan_steps};
pub use progress::{LogReporter, ProgressReporter, SilentReporter};
pub use step::{ReconcileStep, Step, StepOutputs};

use crate::reconcile::{Document, ReconcileError, ReconciliationResult, Reconciler};
use thiserror::Error;

/// Result of one completed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub name: String,
    pub result: ReconciliationResult,
}

/// What a run did, in step order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    outputs: StepOutputs,
}

impl RunReport {
    fn record(&mut self, name: &str, result: ReconciliationResult) {
        self.outputs.insert(name, result.final_state.clone());
        self.steps.push(StepReport {
            name: name.to_string(),
            result,
        });
    }

    pub fn outputs(&self) -> &StepOutputs {
        &self.outputs
    }

    pub fn created(&self) -> usize {
        self.steps.iter().filter(|s| s.result.created).count()
    }

    pub fn updated(&self) -> usize {
        self.steps.iter().filter(|s| s.result.updated).count()
    }

    /// Whether every step found its resource already in the desired state
    pub fn is_noop(&self) -> bool {
        self.steps.iter().all(|s| !s.result.changed())
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("step {position} ({step}) failed")]
    StepFailed {
        step: String,
        /// 1-based position in the run
        position: usize,
        /// Steps that completed before the failure
        completed: RunReport,
        #[source]
        source: ReconcileError,
    },
}

impl OrchestratorError {
    pub fn step(&self) -> &str {
        match self {
            OrchestratorError::StepFailed { step, .. } => step,
        }
    }

    pub fn reconcile_error(&self) -> &ReconcileError {
        match self {
            OrchestratorError::StepFailed { source, .. } => source,
        }
    }

    pub fn completed(&self) -> &RunReport {
        match self {
            OrchestratorError::StepFailed { completed, .. } => completed,
        }
    }

    /// Final state of the last step that completed, if any
    pub fn last_state(&self) -> Option<&Document> {
        self.completed().steps.last().map(|s| &s.result.final_state)
    }
}

/// Runs a list of [`Step`]s in order.
pub struct Orchestrator {
    reconciler: Reconciler,
    steps: Vec<Box<dyn Step>>,
    reporter: Box<dyn ProgressReporter>,
}

impl Orchestrator {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            steps: Vec::new(),
            reporter: Box::new(LogReporter::new()),
        }
    }

    pub fn with_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Append a step
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step, stopping at the first error.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        let total = self.steps.len();
        let mut report = RunReport::default();

        for (index, step) in self.steps.iter().enumerate() {
            let position = index + 1;
            let name = step.name();
            self.reporter.step_started(position, total, name);

            match step.run(&self.reconciler, report.outputs()).await {
                Ok(result) => {
                    self.reporter.step_finished(position, total, name, &result);
                    report.record(name, result);
                }
                Err(source) => {
                    self.reporter.step_failed(position, total, name, &source);
                    return Err(OrchestratorError::StepFailed {
                        step: name.to_string(),
                        position,
                        completed: report,
                        source,
                    });
                }
            }
        }

        Ok(report)
    }
}
