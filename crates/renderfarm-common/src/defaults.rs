//! Default configuration values shared between provisioner and launcher
//!
//! These constants ensure consistent defaults across all renderfarm components.

/// Application name, used to derive the names of every provisioned resource
pub const DEFAULT_APP_NAME: &str = "ECSPOVRayWorker";

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default ECS cluster the worker tasks run in
pub const DEFAULT_CLUSTER: &str = "default";

/// Appended to the local user name to build the default bucket name
pub const BUCKET_SUFFIX: &str = "-pov-ray-bucket";

/// Name of the launcher Lambda function
pub const FUNCTION_NAME: &str = "ecs-worker-launcher";

/// Seconds to wait between lookups of a resource that is not yet visible
pub const DEFAULT_WAIT_SECS: u64 = 5;

/// Number of lookups before giving up on an eventually consistent resource
pub const DEFAULT_RETRIES: u32 = 5;

/// CPU shares for the worker container (POV-Ray wants at least half a CPU)
pub const DEFAULT_CPU_SHARES: i32 = 512;

/// Memory for the worker container in MiB
pub const DEFAULT_MEMORY_MIB: i32 = 512;

/// Only object keys ending in this suffix trigger a render job
pub const DEFAULT_KEY_SUFFIX: &str = ".zip";

/// Environment variable carrying the launcher configuration document
pub const LAUNCHER_CONFIG_ENV: &str = "RENDERFARM_LAUNCHER_CONFIG";

// Serde default functions for struct field defaults

/// Returns the default ECS cluster
pub fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}
