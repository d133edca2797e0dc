//! The render pipeline as an ordered list of steps
//!
//! Bucket, queue, execution role and policy, function, invoke permission,
//! bucket notification, task definition, container-instance role and its
//! bucket policy. A [`Stage`] selects a subset; its dependencies are always
//! included.

use super::Orchestrator;
use super::step::{ReconcileStep, StepOutputs};
use crate::aws::iam::RolePolicyDriver;
use crate::aws::{
    AccountId, AwsContext, BucketDriver, ContainerInstanceRoleDriver, FunctionDriver,
    NotificationDriver, PermissionDriver, QueueDriver, RoleDriver, TaskDefinitionDriver,
    get_current_account_id,
};
use crate::config::PipelineConfig;
use crate::package::FunctionPackage;
use crate::policy;
use crate::reconcile::{ReconcileError, Reconciler, ResourceSpec};
use anyhow::{Context, Result};
use renderfarm_common::ResourceKind;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Every step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepId {
    Bucket,
    Queue,
    ExecutionRole,
    ExecutionPolicy,
    Function,
    FunctionPermission,
    BucketNotification,
    TaskDefinition,
    ContainerRole,
    TaskRolePolicy,
}

impl StepId {
    pub const ALL: [StepId; 10] = [
        StepId::Bucket,
        StepId::Queue,
        StepId::ExecutionRole,
        StepId::ExecutionPolicy,
        StepId::Function,
        StepId::FunctionPermission,
        StepId::BucketNotification,
        StepId::TaskDefinition,
        StepId::ContainerRole,
        StepId::TaskRolePolicy,
    ];

    /// Step name, also the key of its output
    pub fn name(self) -> &'static str {
        match self {
            StepId::Bucket => "bucket",
            StepId::Queue => "queue",
            StepId::ExecutionRole => "execution-role",
            StepId::ExecutionPolicy => "execution-policy",
            StepId::Function => "function",
            StepId::FunctionPermission => "function-permission",
            StepId::BucketNotification => "bucket-notification",
            StepId::TaskDefinition => "task-definition",
            StepId::ContainerRole => "container-role",
            StepId::TaskRolePolicy => "task-role-policy",
        }
    }

    /// Steps that must have run first
    pub fn depends_on(self) -> &'static [StepId] {
        match self {
            StepId::Bucket | StepId::Queue | StepId::ExecutionRole | StepId::ContainerRole => &[],
            StepId::ExecutionPolicy => &[StepId::ExecutionRole],
            StepId::Function => &[StepId::Queue, StepId::ExecutionRole, StepId::ExecutionPolicy],
            StepId::FunctionPermission => &[StepId::Bucket, StepId::Function],
            StepId::BucketNotification => {
                &[StepId::Bucket, StepId::Function, StepId::FunctionPermission]
            }
            StepId::TaskDefinition => &[StepId::Queue],
            StepId::TaskRolePolicy => &[StepId::Bucket, StepId::ContainerRole],
        }
    }
}

/// Subset of the pipeline selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bucket,
    Queue,
    /// Execution role, function, permission and notification
    Lambda,
    /// Task definition
    Ecs,
    /// Bucket access policy on the container instances' role
    RolePolicy,
    /// Everything
    Setup,
}

impl Stage {
    fn targets(self) -> &'static [StepId] {
        match self {
            Stage::Bucket => &[StepId::Bucket],
            Stage::Queue => &[StepId::Queue],
            Stage::Lambda => &[
                StepId::ExecutionRole,
                StepId::ExecutionPolicy,
                StepId::Function,
                StepId::FunctionPermission,
                StepId::BucketNotification,
            ],
            Stage::Ecs => &[StepId::TaskDefinition],
            Stage::RolePolicy => &[StepId::ContainerRole, StepId::TaskRolePolicy],
            Stage::Setup => &StepId::ALL,
        }
    }
}

/// Steps `stage` needs, dependencies included, in execution order.
pub fn plan_steps(stage: Stage) -> Vec<StepId> {
    let mut needed = BTreeSet::new();
    let mut pending = stage.targets().to_vec();
    while let Some(step) = pending.pop() {
        if needed.insert(step) {
            pending.extend_from_slice(step.depends_on());
        }
    }
    StepId::ALL
        .into_iter()
        .filter(|step| needed.contains(step))
        .collect()
}

/// Launcher configuration pointing at `queue_url`, serialized for the
/// function environment.
fn launcher_config_json(config: &PipelineConfig, queue_url: &str) -> Result<String, ReconcileError> {
    config
        .launcher_config(queue_url)
        .to_json()
        .map_err(|e| ReconcileError::malformed("launcher config", e.to_string()))
}

/// Build the orchestrator for `stage`.
///
/// Inputs the planned steps need are checked up front: the launcher binary
/// is packaged, the worker image must be set, and the account ID is looked
/// up through STS.
pub async fn build_pipeline(
    config: &PipelineConfig,
    ctx: &AwsContext,
    stage: Stage,
) -> Result<Orchestrator> {
    let plan = plan_steps(stage);
    info!(stage = ?stage, steps = plan.len(), "Planning pipeline");

    let mut package = if plan.contains(&StepId::Function) {
        let path = config.launcher_binary.as_deref().context(
            "Launcher binary required for the function step (--launcher-binary or RENDERFARM_LAUNCHER_BINARY)",
        )?;
        let package = FunctionPackage::from_binary_path(path)
            .with_context(|| format!("Failed to package launcher {}", path.display()))?;
        info!(path = %path.display(), code_sha256 = %package.code_sha256(), "Packaged launcher");
        Some(package)
    } else {
        None
    };

    let image = if plan.contains(&StepId::TaskDefinition) {
        let image = config
            .worker
            .image
            .clone()
            .context("Worker image required for the task definition step (--image or RENDERFARM_IMAGE)")?;
        Some(image)
    } else {
        None
    };

    let account = if plan.contains(&StepId::FunctionPermission) {
        Some(get_current_account_id(&ctx.sts_client()).await?)
    } else {
        None
    };

    let config = Arc::new(config.clone());
    let mut orchestrator = Orchestrator::new(Reconciler::new(config.retry));

    for step in plan {
        let cfg = Arc::clone(&config);
        let name = step.name();
        match step {
            StepId::Bucket => {
                let driver = BucketDriver::new(ctx.s3_client(), &config.app_name);
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    Ok(ResourceSpec::new(ResourceKind::Bucket, &cfg.bucket, policy::bucket(&cfg)))
                })));
            }
            StepId::Queue => {
                let driver = QueueDriver::new(ctx.sqs_client(), &config.app_name);
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    Ok(ResourceSpec::new(ResourceKind::Queue, cfg.queue_name(), policy::queue(&cfg)))
                })));
            }
            StepId::ExecutionRole => {
                let driver = RoleDriver::new(ctx.iam_client(), &config.app_name);
                let step = ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    Ok(ResourceSpec::new(
                        ResourceKind::ExecutionRole,
                        cfg.execution_role_name(),
                        policy::execution_role(&cfg),
                    ))
                })
                .with_settle(config.retry.delay);
                orchestrator.push(Box::new(step));
            }
            StepId::ExecutionPolicy => {
                let driver = RolePolicyDriver::new(ctx.iam_client());
                let step = ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    let role = cfg.execution_role_name();
                    let policy_name = cfg.execution_policy_name();
                    Ok(ResourceSpec::new(
                        ResourceKind::RolePolicy,
                        RolePolicyDriver::identity(&role, policy_name),
                        policy::role_policy(&role, policy_name, policy::execution_policy()),
                    ))
                })
                .with_settle(config.retry.delay);
                orchestrator.push(Box::new(step));
            }
            StepId::Function => {
                let package = package
                    .take()
                    .context("Launcher package missing for the function step")?;
                let code_sha256 = package.code_sha256().to_string();
                let driver =
                    FunctionDriver::new(ctx.lambda_client(), package, &config.app_name, config.retry);
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |outputs: &StepOutputs| {
                    let role_arn = outputs.require_str(StepId::ExecutionRole.name(), "Arn")?;
                    let queue_url = outputs.require_str(StepId::Queue.name(), "QueueUrl")?;
                    let launcher = launcher_config_json(&cfg, queue_url)?;
                    Ok(ResourceSpec::new(
                        ResourceKind::Function,
                        cfg.function_name(),
                        policy::function(&cfg, role_arn, &code_sha256, &launcher),
                    ))
                })));
            }
            StepId::FunctionPermission => {
                let account: AccountId = account
                    .clone()
                    .context("Account ID missing for the permission step")?;
                let driver = PermissionDriver::new(ctx.lambda_client(), config.function_name());
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    Ok(ResourceSpec::new(
                        ResourceKind::FunctionPermission,
                        cfg.permission_statement_id(),
                        policy::function_permission(&cfg, &account),
                    ))
                })));
            }
            StepId::BucketNotification => {
                let driver = NotificationDriver::new(ctx.s3_client());
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |outputs: &StepOutputs| {
                    let function_arn = outputs.require_str(StepId::Function.name(), "FunctionArn")?;
                    Ok(ResourceSpec::new(
                        ResourceKind::BucketNotification,
                        &cfg.bucket,
                        policy::bucket_notification(&cfg, function_arn),
                    ))
                })));
            }
            StepId::TaskDefinition => {
                let image = image
                    .clone()
                    .context("Worker image missing for the task definition step")?;
                let driver = TaskDefinitionDriver::new(ctx.ecs_client());
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |outputs: &StepOutputs| {
                    let queue_url = outputs.require_str(StepId::Queue.name(), "QueueUrl")?;
                    Ok(ResourceSpec::new(
                        ResourceKind::TaskDefinition,
                        cfg.task_family(),
                        policy::task_definition(&cfg, &image, queue_url),
                    ))
                })));
            }
            StepId::ContainerRole => {
                let driver = ContainerInstanceRoleDriver::new(
                    ctx.ecs_client(),
                    ctx.ec2_client(),
                    ctx.iam_client(),
                );
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |_: &StepOutputs| {
                    Ok(ResourceSpec::new(
                        ResourceKind::ContainerInstanceRole,
                        &cfg.cluster,
                        policy::container_instance_role(&cfg),
                    ))
                })));
            }
            StepId::TaskRolePolicy => {
                let driver = RolePolicyDriver::new(ctx.iam_client());
                orchestrator.push(Box::new(ReconcileStep::new(name, driver, move |outputs: &StepOutputs| {
                    let role = outputs.require_str(StepId::ContainerRole.name(), "RoleName")?;
                    let policy_name = cfg.bucket_access_policy_name();
                    Ok(ResourceSpec::new(
                        ResourceKind::RolePolicy,
                        RolePolicyDriver::identity(role, &policy_name),
                        policy::role_policy(role, &policy_name, policy::bucket_access_policy(&cfg.bucket)),
                    ))
                })));
            }
        }
    }

    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderfarm_common::LauncherConfig;

    fn names(steps: &[StepId]) -> Vec<&'static str> {
        steps.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_setup_runs_everything_in_order() {
        assert_eq!(plan_steps(Stage::Setup), StepId::ALL.to_vec());
    }

    #[test]
    fn test_single_resource_stages() {
        assert_eq!(plan_steps(Stage::Bucket), vec![StepId::Bucket]);
        assert_eq!(plan_steps(Stage::Queue), vec![StepId::Queue]);
        assert_eq!(names(&plan_steps(Stage::Ecs)), vec!["queue", "task-definition"]);
    }

    #[test]
    fn test_lambda_stage_pulls_in_bucket_and_queue() {
        assert_eq!(
            names(&plan_steps(Stage::Lambda)),
            vec![
                "bucket",
                "queue",
                "execution-role",
                "execution-policy",
                "function",
                "function-permission",
                "bucket-notification",
            ]
        );
    }

    #[test]
    fn test_role_policy_stage() {
        assert_eq!(
            names(&plan_steps(Stage::RolePolicy)),
            vec!["bucket", "container-role", "task-role-policy"]
        );
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        for step in StepId::ALL {
            for dep in step.depends_on() {
                assert!(dep < &step, "{} must run before {}", dep.name(), step.name());
            }
        }
    }

    #[test]
    fn test_launcher_config_json() {
        let config = PipelineConfig {
            app_name: "App".to_string(),
            cluster: "render".to_string(),
            key_suffixes: vec![".zip".to_string(), ".pov".to_string()],
            ..Default::default()
        };
        let json = launcher_config_json(&config, "https://sqs/q").unwrap();
        let parsed = LauncherConfig::from_json(&json).unwrap();
        assert_eq!(parsed.queue_url, "https://sqs/q");
        assert_eq!(parsed.task_definition, "AppTask");
        assert_eq!(parsed.cluster, "render");
        assert!(parsed.accepts_key("scene.pov"));
    }
}
