//! Generic reconciliation engine
//!
//! A [`ResourceDriver`] knows how to find, create, compare and update one
//! kind of resource. The [`Reconciler`] combines those four operations into
//! an idempotent find-or-create-or-update with retried lookups.

pub mod document;
pub mod driver;
pub mod error;
pub mod reconciler;

pub use document::{Document, canonical_json, canonicalize, converged, documents_match};
pub use driver::{ReconciliationResult, ResourceDriver, ResourceSpec};
pub use error::ReconcileError;
pub use reconciler::Reconciler;
