//! Resource driver abstraction and the values flowing through it

use super::document::{Document, converged};
use super::error::ReconcileError;
use renderfarm_common::ResourceKind;

/// What should exist, identified by a kind-specific key.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Name or ID the driver looks the resource up by
    pub identity_key: String,
    pub desired_state: Document,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, identity_key: impl Into<String>, desired_state: Document) -> Self {
        Self {
            kind,
            identity_key: identity_key.into(),
            desired_state,
        }
    }

    /// Human readable description used in logs and errors
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.kind, self.identity_key)
    }
}

/// Outcome of reconciling one resource.
///
/// At most one of `created` and `updated` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    /// The resource existed when reconciliation started
    pub found: bool,
    pub created: bool,
    pub updated: bool,
    /// State observed (or returned by the provider) at the end
    pub final_state: Document,
}

impl ReconciliationResult {
    pub(crate) fn unchanged(state: Document) -> Self {
        Self {
            found: true,
            created: false,
            updated: false,
            final_state: state,
        }
    }

    pub(crate) fn created(state: Document) -> Self {
        Self {
            found: false,
            created: true,
            updated: false,
            final_state: state,
        }
    }

    pub(crate) fn updated(state: Document) -> Self {
        Self {
            found: true,
            created: false,
            updated: true,
            final_state: state,
        }
    }

    /// Whether any mutating call was made
    pub fn changed(&self) -> bool {
        self.created || self.updated
    }

    /// Short label for reports
    pub fn action(&self) -> &'static str {
        if self.created {
            "created"
        } else if self.updated {
            "updated"
        } else {
            "unchanged"
        }
    }
}

/// Provider-specific access to one kind of resource.
///
/// `find` is read-only and may be called repeatedly. `create` and `update`
/// mutate and are called at most once per reconciliation. `compare` is pure.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait ResourceDriver: Send + Sync {
    /// Look the resource up. `Ok(None)` means it does not exist (yet).
    async fn find(&self, identity_key: &str) -> Result<Option<Document>, ReconcileError>;

    /// Create the resource and return the provider's view of it.
    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError>;

    /// Whether `existing` already satisfies `desired`.
    fn compare(&self, existing: &Document, desired: &Document) -> bool {
        converged(existing, desired)
    }

    /// Bring an existing resource to `desired`.
    async fn update(&self, identity_key: &str, desired: &Document)
    -> Result<Document, ReconcileError>;
}
