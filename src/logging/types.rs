//! Core logging types: per-target entries, status, and the [`Log`] trait.

/// Outcome of one target branch, for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    /// `owner/repo/branch`.
    pub target: String,
    /// Final status of the target.
    pub status: TargetStatus,
    /// Optional detail (PR number, failure reason).
    pub message: Option<String>,
}

/// Final status of a target branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Changes reached the target branch.
    Synced,
    /// A pull request was opened and left for review.
    Opened,
    /// The target already matched; nothing was published.
    Unchanged,
    /// Dry run; changes were only reported.
    DryRun,
    /// Publishing or cleanup failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) is the production implementation;
/// tests substitute recorders, so engine code logs without knowing where
/// output goes.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a target outcome for the summary.
    fn record_target(&self, target: &str, status: TargetStatus, message: Option<&str>);
}
