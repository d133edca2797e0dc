//! renderfarm-launcher - S3 upload to render job
//!
//! Invoked by the scene bucket's notification. For an accepted object key it
//! forwards the event to the job queue and starts one worker task.
//!
//! ## Modules
//!
//! - [`dispatch`]: SQS and ECS calls behind a trait
//! - [`error`]: Launcher errors
//! - [`event`]: S3 event parsing
//! - [`handler`]: The invocation handler

pub mod dispatch;
pub mod error;
pub mod event;
pub mod handler;

pub use dispatch::{AwsDispatcher, JobDispatcher};
pub use error::LauncherError;
pub use handler::{Outcome, handle};
