//! Lambda entry point for the render job launcher

use aws_config::BehaviorVersion;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use renderfarm_common::LauncherConfig;
use renderfarm_launcher::{AwsDispatcher, handle};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CloudWatch adds its own timestamps and does not render ANSI
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .init();

    let config = LauncherConfig::from_env()?;
    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let dispatcher = AwsDispatcher::new(&aws);

    let config = &config;
    let dispatcher = &dispatcher;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle(config, dispatcher, &event.payload)
            .await
            .map_err(Error::from)
    }))
    .await
}
