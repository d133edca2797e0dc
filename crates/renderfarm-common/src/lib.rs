//! renderfarm-common - Shared types and utilities
//!
//! This crate provides the pieces used by both the provisioner and the
//! launcher function, without any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`launcher_config`]: Configuration document handed to the launcher function
//! - [`resource_kind`]: Kinds of AWS resources the provisioner reconciles
//! - [`tags`]: AWS resource tag constants

pub mod defaults;
pub mod launcher_config;
pub mod resource_kind;
pub mod tags;

// Re-export commonly used types
pub use launcher_config::{ConfigError, LauncherConfig};
pub use resource_kind::ResourceKind;
