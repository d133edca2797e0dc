//! renderfarm-provisioner - idempotent AWS provisioning for the render pipeline
//!
//! Uploading a scene archive to the bucket triggers the launcher function,
//! which enqueues a job and starts an ECS worker task. This crate creates or
//! repairs every resource that chain needs, and is safe to run repeatedly.

pub mod aws;
pub mod config;
pub mod orchestrator;
pub mod package;
pub mod policy;
pub mod reconcile;
pub mod wait;
