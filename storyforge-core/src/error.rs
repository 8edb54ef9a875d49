//! Caller-facing error taxonomy.
//!
//! Only structural violations are errors. Continuity problems are reported as
//! data in a [`ValidationReport`](crate::continuity::ValidationReport).

use crate::branch::{AuthorId, BranchId};
use crate::narrative::GenerationError;
use crate::persist::PersistError;
use thiserror::Error;

/// Errors from branch manager operations.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{actor} is not allowed to {action} branch {branch_id}")]
    Unauthorized {
        actor: AuthorId,
        branch_id: BranchId,
        action: &'static str,
    },

    #[error("Stale write to {branch_id}: read version {expected}, found {found}")]
    StaleWrite {
        branch_id: BranchId,
        expected: u32,
        found: u32,
    },

    #[error("Continuity validation failed: {0}")]
    ValidationFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] PersistError),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
}

impl StoryError {
    /// A branch that does not resolve in the store.
    pub fn branch_not_found(id: BranchId) -> Self {
        Self::NotFound {
            what: format!("Branch {id}"),
        }
    }

    /// A version that is not retained for a branch.
    pub fn version_not_found(id: BranchId, version: u32) -> Self {
        Self::NotFound {
            what: format!("Version {version} of branch {id}"),
        }
    }

    pub fn unauthorized(actor: &AuthorId, branch_id: BranchId, action: &'static str) -> Self {
        Self::Unauthorized {
            actor: actor.clone(),
            branch_id,
            action,
        }
    }

    /// Whether this error is a not-found of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoryError::NotFound { .. })
    }
}

/// Result alias for branch manager operations.
pub type StoryResult<T> = Result<T, StoryError>;
