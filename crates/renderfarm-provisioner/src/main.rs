//! renderfarm: provisions the S3 to Lambda to SQS to ECS render pipeline
//!
//! Every subcommand is idempotent: resources that already match are left
//! alone, drifted ones are updated, missing ones are created.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use renderfarm_common::defaults::{
    DEFAULT_APP_NAME, DEFAULT_CLUSTER, DEFAULT_CPU_SHARES, DEFAULT_KEY_SUFFIX, DEFAULT_MEMORY_MIB,
    DEFAULT_REGION, DEFAULT_RETRIES, DEFAULT_WAIT_SECS,
};
use renderfarm_provisioner::aws::lambda::function_arn;
use renderfarm_provisioner::aws::{AwsContext, AwsError, QueueDriver};
use renderfarm_provisioner::config::{self, PipelineConfig};
use renderfarm_provisioner::orchestrator::{OrchestratorError, RunReport, Stage, build_pipeline};
use renderfarm_provisioner::policy;
use renderfarm_provisioner::reconcile::ResourceDriver;
use renderfarm_provisioner::reconcile::document::required_str;
use renderfarm_provisioner::wait::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "renderfarm")]
#[command(about = "Idempotent provisioning for the ECS POV-Ray render pipeline")]
#[command(version)]
struct Args {
    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Command,
}

/// Settings shared by every subcommand
#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// Prefix for derived resource names
    #[arg(long, global = true, default_value = DEFAULT_APP_NAME)]
    app_name: String,

    /// AWS region
    #[arg(long, global = true, default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use (default: the SDK credential chain)
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Scene bucket (default: <user>-pov-ray-bucket)
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// ECS cluster the worker runs in
    #[arg(long, global = true, default_value = DEFAULT_CLUSTER)]
    cluster: String,

    /// Worker container image
    #[arg(long, global = true, env = "RENDERFARM_IMAGE")]
    image: Option<String>,

    /// Worker CPU shares
    #[arg(long, global = true, default_value_t = DEFAULT_CPU_SHARES)]
    cpu: i32,

    /// Worker memory in MiB
    #[arg(long, global = true, default_value_t = DEFAULT_MEMORY_MIB)]
    memory: i32,

    /// Prebuilt launcher `bootstrap` binary
    #[arg(long, global = true, env = "RENDERFARM_LAUNCHER_BINARY")]
    launcher_binary: Option<PathBuf>,

    /// Object key suffix that starts a render job (repeatable)
    #[arg(long = "key-suffix", global = true, default_value = DEFAULT_KEY_SUFFIX)]
    key_suffixes: Vec<String>,

    /// Seconds between lookups of a resource that is not visible yet
    #[arg(long, global = true, default_value_t = DEFAULT_WAIT_SECS)]
    wait_secs: u64,

    /// Lookups before giving up on a resource
    #[arg(long, global = true, default_value_t = DEFAULT_RETRIES)]
    retries: u32,
}

impl From<PipelineArgs> for PipelineConfig {
    fn from(args: PipelineArgs) -> Self {
        Self {
            app_name: args.app_name,
            aws: config::AwsConfig {
                region: args.region,
                profile: args.profile,
            },
            bucket: args.bucket.unwrap_or_else(config::default_bucket_name),
            cluster: args.cluster,
            worker: config::WorkerConfig {
                image: args.image,
                cpu: args.cpu,
                memory: args.memory,
            },
            launcher_binary: args.launcher_binary,
            key_suffixes: args.key_suffixes,
            retry: RetryPolicy::new(args.retries, Duration::from_secs(args.wait_secs)),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the whole pipeline
    Setup,
    /// Reconcile the scene bucket
    Bucket,
    /// Reconcile the job queue
    Queue,
    /// Reconcile the launcher function, its role and its bucket trigger
    Lambda,
    /// Register the worker task definition
    Ecs,
    /// Grant the ECS container instances access to the bucket
    RolePolicy,
    /// Print a desired-state document without changing anything
    Show {
        #[command(subcommand)]
        document: ShowCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ShowCommand {
    /// Trust policy of the launcher execution role
    TrustPolicy,
    /// Inline policy of the launcher execution role
    ExecutionPolicy,
    /// Bucket access policy for the container instances' role
    BucketPolicy,
    /// Launcher configuration (looks up the queue)
    LauncherConfig,
    /// Bucket notification configuration (looks up the function)
    Notification,
    /// Worker task definition (looks up the queue)
    TaskDefinition,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut suggestion = None;
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        if let Some(aws) = cause.downcast_ref::<AwsError>() {
            suggestion = suggestion.or(aws.suggestion());
        }
        source = cause.source();
    }

    if let Some(failed) = e.downcast_ref::<OrchestratorError>() {
        if let Some(state) = failed.last_state() {
            let completed = failed.completed().steps.last().map_or("", |s| s.name.as_str());
            let pretty = serde_json::to_string_pretty(state).unwrap_or_else(|_| state.to_string());
            let _ = writeln!(stderr, "\n\x1b[2mLast state ({completed}):\x1b[0m\n{pretty}");
        }
    }

    if let Some(hint) = suggestion {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing() -> Result<()> {
    // Reduce noise from the AWS SDK
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into())
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?)
        .add_directive("aws_sdk_sts=warn".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config: PipelineConfig = args.pipeline.into();

    match args.command {
        Command::Setup => provision(Stage::Setup, &config).await,
        Command::Bucket => provision(Stage::Bucket, &config).await,
        Command::Queue => provision(Stage::Queue, &config).await,
        Command::Lambda => provision(Stage::Lambda, &config).await,
        Command::Ecs => provision(Stage::Ecs, &config).await,
        Command::RolePolicy => provision(Stage::RolePolicy, &config).await,
        Command::Show { document } => show(document, &config).await,
    }
}

async fn aws_context(config: &PipelineConfig) -> AwsContext {
    if let Some(profile) = &config.aws.profile {
        info!(profile = %profile, region = %config.aws.region, "Using AWS profile");
    }
    AwsContext::with_profile(&config.aws.region, config.aws.profile.as_deref()).await
}

async fn provision(stage: Stage, config: &PipelineConfig) -> Result<()> {
    info!(
        stage = ?stage,
        app = %config.app_name,
        bucket = %config.bucket,
        cluster = %config.cluster,
        "Provisioning"
    );

    let ctx = aws_context(config).await;
    let orchestrator = build_pipeline(config, &ctx, stage).await?;
    let report = orchestrator.run().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\n{:<22} {:<10}", "STEP", "ACTION");
    println!("{}", "-".repeat(33));
    for step in &report.steps {
        println!("{:<22} {:<10}", step.name, step.result.action());
    }
    let unchanged = report.steps.len() - report.created() - report.updated();
    println!(
        "\n{} created, {} updated, {} unchanged",
        report.created(),
        report.updated(),
        unchanged
    );
}

async fn existing_queue_url(config: &PipelineConfig, ctx: &AwsContext) -> Result<String> {
    let queue = QueueDriver::new(ctx.sqs_client(), &config.app_name)
        .find(&config.queue_name())
        .await?
        .with_context(|| {
            format!(
                "Queue {} does not exist, run `renderfarm queue` first",
                config.queue_name()
            )
        })?;
    Ok(required_str(&queue, "QueueUrl", "queue")?.to_string())
}

async fn show(document: ShowCommand, config: &PipelineConfig) -> Result<()> {
    let doc = match document {
        ShowCommand::TrustPolicy => policy::lambda_trust_policy(),
        ShowCommand::ExecutionPolicy => policy::execution_policy(),
        ShowCommand::BucketPolicy => policy::bucket_access_policy(&config.bucket),
        ShowCommand::LauncherConfig => {
            let ctx = aws_context(config).await;
            let queue_url = existing_queue_url(config, &ctx).await?;
            serde_json::to_value(config.launcher_config(&queue_url))?
        }
        ShowCommand::Notification => {
            let ctx = aws_context(config).await;
            let arn = function_arn(&ctx.lambda_client(), config.function_name())
                .await?
                .with_context(|| {
                    format!(
                        "Function {} does not exist, run `renderfarm lambda` first",
                        config.function_name()
                    )
                })?;
            policy::bucket_notification(config, &arn)
        }
        ShowCommand::TaskDefinition => {
            let image = config
                .worker
                .image
                .as_deref()
                .context("Worker image required (--image or RENDERFARM_IMAGE)")?;
            let ctx = aws_context(config).await;
            let queue_url = existing_queue_url(config, &ctx).await?;
            policy::task_definition(config, image, &queue_url)
        }
    };

    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
