//! Convergence of staged work onto target branches, then cleanup.
//!
//! Publishing happens only after every entry has been staged. Units with a
//! change are published (in parallel when the backend allows it); afterwards
//! every created unit is cleaned up, whether it published, failed, or had
//! nothing to publish.
use crate::backend::{Cleanup, Publication, StagingBackend};
use crate::error::SyncError;
use crate::logging::{Log, TargetStatus};
use crate::reconcile::CancelFlag;
use crate::staging::{StagingUnit, TargetBranch};

/// Final outcome of one target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Nothing differed; nothing was published.
    Unchanged,
    /// Changes reached the target (merged pull request or push).
    Published(Publication),
    /// A pull request was opened and left for review.
    PullRequestOpened {
        /// Pull request number.
        number: u64,
    },
    /// Publishing failed or was not attempted.
    PublishFailed(String),
    /// Dry run; `changes` mutations would have been applied.
    DryRun {
        /// Number of mutations that would change the branch.
        changes: usize,
    },
}

/// Per-target line of a run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// The target branch.
    pub target: TargetBranch,
    /// Real changes staged (or previewed, in a dry run).
    pub changes: usize,
    /// What happened to the target.
    pub outcome: TargetOutcome,
    /// Cleanup result; `None` when no unit was created.
    pub cleanup: Option<Result<Cleanup, String>>,
}

impl UnitReport {
    /// Whether publishing or cleanup failed for this target.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, TargetOutcome::PublishFailed(_))
            || matches!(self.cleanup, Some(Err(_)))
    }
}

/// Settings shared by every publish in a run.
#[derive(Debug, Clone, Copy)]
pub struct PublishOptions<'a> {
    /// Commit message / pull request title.
    pub message: &'a str,
    /// Publish units concurrently if the backend allows it.
    pub parallel: bool,
    /// Checked before each publish.
    pub cancel: &'a CancelFlag,
}

enum Attempt {
    NoChange,
    Done(Publication),
    Failed(SyncError),
    Skipped(&'static str),
}

fn attempt<B: StagingBackend + ?Sized>(
    backend: &B,
    unit: &StagingUnit,
    options: &PublishOptions<'_>,
    log: &dyn Log,
) -> Attempt {
    if !unit.has_change {
        return Attempt::NoChange;
    }
    if options.cancel.is_cancelled() {
        return Attempt::Skipped("run cancelled");
    }
    log.debug(&format!(
        "publishing {} ({} change(s)) from {}",
        unit.target, unit.changes, unit.staging_name
    ));
    match backend.publish(unit, options.message) {
        Ok(publication) => Attempt::Done(publication),
        Err(e) => Attempt::Failed(e),
    }
}

fn publish_all<B: StagingBackend + ?Sized>(
    backend: &B,
    units: &[StagingUnit],
    options: &PublishOptions<'_>,
    log: &dyn Log,
) -> Vec<Attempt> {
    if options.parallel && backend.parallel_publish() {
        use rayon::prelude::*;
        return units
            .par_iter()
            .map(|unit| attempt(backend, unit, options, log))
            .collect();
    }
    let mut fatal_seen = false;
    units
        .iter()
        .map(|unit| {
            if fatal_seen && unit.has_change {
                return Attempt::Skipped("not attempted after an earlier fatal error");
            }
            let result = attempt(backend, unit, options, log);
            if let Attempt::Failed(e) = &result
                && e.is_fatal()
            {
                fatal_seen = true;
            }
            result
        })
        .collect()
}

/// Clean up one unit, logging the result. Failures never propagate.
pub(crate) fn release<B: StagingBackend + ?Sized>(
    backend: &B,
    unit: &StagingUnit,
    publication: Option<&Publication>,
    log: &dyn Log,
) -> Result<Cleanup, String> {
    match backend.cleanup(unit, publication) {
        Ok(Cleanup::Deleted) => {
            log.debug(&format!("deleted {} in {}", unit.staging_name, unit.target.repo));
            Ok(Cleanup::Deleted)
        }
        Ok(Cleanup::Retained) => {
            log.info(&format!(
                "Kept {} in {} for the open pull request",
                unit.staging_name, unit.target.repo
            ));
            Ok(Cleanup::Retained)
        }
        Ok(Cleanup::Local) => Ok(Cleanup::Local),
        Err(e) => {
            log.warn(&e.to_string());
            Err(e.to_string())
        }
    }
}

pub(crate) fn record(log: &dyn Log, report: &UnitReport) {
    let target = report.target.to_string();
    let (status, message) = match &report.outcome {
        TargetOutcome::Unchanged => (TargetStatus::Unchanged, None),
        TargetOutcome::Published(Publication::Merged { number }) => {
            (TargetStatus::Synced, Some(format!("merged #{number}")))
        }
        TargetOutcome::Published(_) => (TargetStatus::Synced, Some("pushed".to_string())),
        TargetOutcome::PullRequestOpened { number } => {
            (TargetStatus::Opened, Some(format!("#{number}")))
        }
        TargetOutcome::PublishFailed(reason) => (TargetStatus::Failed, Some(reason.clone())),
        TargetOutcome::DryRun { changes } => {
            (TargetStatus::DryRun, Some(format!("{changes} change(s)")))
        }
    };
    match (&report.cleanup, status) {
        (Some(Err(reason)), s) if s != TargetStatus::Failed => {
            log.record_target(&target, TargetStatus::Failed, Some(&format!("cleanup: {reason}")));
        }
        _ => log.record_target(&target, status, message.as_deref()),
    }
}

/// Publish every unit with a change, then clean up every unit.
///
/// Recoverable failures are logged and reported per target. Cleanup is
/// attempted for all `units` even when publishing failed.
///
/// # Errors
///
/// Returns the first fatal publish error (after cleanup has run), or
/// [`SyncError::Cancelled`] if the run was cancelled.
pub fn converge<B: StagingBackend + ?Sized>(
    backend: &B,
    units: &[StagingUnit],
    options: &PublishOptions<'_>,
    log: &dyn Log,
) -> Result<Vec<UnitReport>, SyncError> {
    let attempts = publish_all(backend, units, options, log);

    let mut fatal = None;
    let mut reports = Vec::with_capacity(units.len());
    for (unit, attempt) in units.iter().zip(attempts) {
        let (outcome, publication) = match attempt {
            Attempt::NoChange => (TargetOutcome::Unchanged, None),
            Attempt::Done(publication) => {
                let outcome = match publication {
                    Publication::Opened { number } => {
                        log.info(&format!("Opened pull request #{number} for {}", unit.target));
                        TargetOutcome::PullRequestOpened { number }
                    }
                    Publication::Merged { number } => {
                        log.info(&format!("Merged pull request #{number} into {}", unit.target));
                        TargetOutcome::Published(publication.clone())
                    }
                    Publication::Pushed => {
                        log.info(&format!("Pushed {}", unit.target));
                        TargetOutcome::Published(publication.clone())
                    }
                };
                (outcome, Some(publication))
            }
            Attempt::Failed(e) => {
                let reason = e.to_string();
                if e.is_fatal() {
                    log.error(&reason);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                } else {
                    log.warn(&reason);
                }
                (TargetOutcome::PublishFailed(reason), None)
            }
            Attempt::Skipped(why) => (TargetOutcome::PublishFailed(why.to_string()), None),
        };
        let cleanup = release(backend, unit, publication.as_ref(), log);
        let report = UnitReport {
            target: unit.target.clone(),
            changes: unit.changes,
            outcome,
            cleanup: Some(cleanup),
        };
        record(log, &report);
        reports.push(report);
    }

    if let Some(e) = fatal {
        return Err(e);
    }
    if options.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(reports)
}
