//! Staging backends: where changes are staged and how they converge.
//!
//! The reconciliation order (resolve, stage, publish, clean up) is shared;
//! a [`StagingBackend`] supplies the strategy-specific steps:
//!
//! - [`api::ApiBackend`] stages on a temporary remote branch and converges
//!   through a pull request.
//! - [`clone::CloneBackend`] stages on a local branch of a clone, batching
//!   every change into one amended commit, and converges by pushing.
pub mod api;
pub mod clone;

use crate::error::SyncError;
use crate::fingerprint::ContentFingerprint;
use crate::github::RepoId;
use crate::staging::{StagingUnit, TargetBranch};

/// A requested change to one destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation<'a> {
    /// Create or overwrite the file with these bytes.
    Write(&'a [u8]),
    /// Remove the file if present.
    Delete,
}

/// How a unit's staged work reached its target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    /// Pull request opened and squash-merged.
    Merged {
        /// Pull request number.
        number: u64,
    },
    /// Pull request opened and left for review.
    Opened {
        /// Pull request number.
        number: u64,
    },
    /// Local branch pushed onto the target.
    Pushed,
}

/// What cleanup did for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// The staging branch was deleted.
    Deleted,
    /// The staging branch was kept because an open pull request uses it.
    Retained,
    /// Nothing to delete remotely; local state goes with the run's temp dir.
    Local,
}

/// Strategy-specific half of the reconciliation workflow.
///
/// Implementations must be safe to share across threads: publishing may run
/// in parallel when [`parallel_publish`](Self::parallel_publish) allows it.
pub trait StagingBackend: Send + Sync {
    /// Short strategy name for log output.
    fn name(&self) -> &'static str;

    /// Branch names currently present in `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the branches cannot be listed.
    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, SyncError>;

    /// Digest of `path` on the live target branch, without staging anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch or file cannot be read.
    fn current_digest(
        &self,
        target: &TargetBranch,
        path: &str,
    ) -> Result<Option<ContentFingerprint>, SyncError>;

    /// Create the staging branch `staging_name` at the tip of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BaseRef`] if the target branch cannot be
    /// resolved, or another error if the staging branch cannot be created.
    fn create_unit(&self, target: &TargetBranch, staging_name: &str) -> Result<(), SyncError>;

    /// Apply `mutation` to `path` inside `unit`; returns whether anything
    /// actually changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state cannot be read or the change
    /// cannot be written.
    fn apply(
        &self,
        unit: &StagingUnit,
        path: &str,
        mutation: Mutation<'_>,
        message: &str,
    ) -> Result<bool, SyncError>;

    /// Converge a unit with staged changes onto its target branch.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails; [`SyncError::is_fatal`] tells
    /// whether the run may continue.
    fn publish(&self, unit: &StagingUnit, message: &str) -> Result<Publication, SyncError>;

    /// Release a unit after publishing was attempted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cleanup`] if the staging branch cannot be
    /// removed.
    fn cleanup(
        &self,
        unit: &StagingUnit,
        publication: Option<&Publication>,
    ) -> Result<Cleanup, SyncError>;

    /// Whether [`publish`](Self::publish) may run for several units at once.
    fn parallel_publish(&self) -> bool {
        false
    }
}
