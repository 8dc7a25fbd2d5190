//! The run controller: stage every entry, then publish and clean up.
//!
//! A [`SyncRun`] owns all per-run state (the staging memo and the branch
//! listing cache) and enforces the phase order:
//!
//! 1. For each entry, resolve target branches and apply the change inside
//!    the target's staging unit, skipping no-ops.
//! 2. Publish every unit holding a change.
//! 3. Clean up every unit that was created.
//!
//! Any error during step 1 is fatal; cleanup still runs for the units
//! created so far before the error is returned.
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::backend::{Mutation, StagingBackend};
use crate::branches;
use crate::config::{Action, ConfigEntry};
use crate::error::SyncError;
use crate::fingerprint::is_noop;
use crate::github::RepoId;
use crate::logging::Log;
use crate::publish::{self, PublishOptions, TargetOutcome, UnitReport};
use crate::staging::{StagingSet, TargetBranch};

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Commit message and pull request title.
    pub message: String,
    /// Resolve and report only; create and publish nothing.
    pub dry_run: bool,
    /// Allow concurrent publishing where the backend supports it.
    pub parallel: bool,
}

/// What a run did, target by target, in first-touched order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One line per target branch.
    pub units: Vec<UnitReport>,
}

impl RunReport {
    /// Number of targets whose publish or cleanup failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.units.iter().filter(|u| u.is_failure()).count()
    }

    /// Targets that received changes.
    pub fn published(&self) -> impl Iterator<Item = &TargetBranch> {
        self.units.iter().filter_map(|u| match u.outcome {
            TargetOutcome::Published(_) | TargetOutcome::PullRequestOpened { .. } => {
                Some(&u.target)
            }
            _ => None,
        })
    }

    /// Report line for `target`, if it was touched.
    #[must_use]
    pub fn get(&self, target: &TargetBranch) -> Option<&UnitReport> {
        self.units.iter().find(|u| &u.target == target)
    }
}

/// One reconciliation run over a list of config entries.
pub struct SyncRun<'a, B: StagingBackend + ?Sized> {
    backend: &'a B,
    log: &'a dyn Log,
    options: RunOptions,
    cancel: CancelFlag,
    staging: StagingSet,
    branch_cache: HashMap<RepoId, Vec<String>>,
    previews: Vec<(TargetBranch, usize)>,
}

impl<B: StagingBackend + ?Sized> std::fmt::Debug for SyncRun<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRun")
            .field("backend", &self.backend.name())
            .field("options", &self.options)
            .field("units", &self.staging.len())
            .finish_non_exhaustive()
    }
}

impl<'a, B: StagingBackend + ?Sized> SyncRun<'a, B> {
    /// Prepare a run; `started_at` seeds the staging branch names.
    #[must_use]
    pub fn new(
        backend: &'a B,
        log: &'a dyn Log,
        options: RunOptions,
        cancel: CancelFlag,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            backend,
            log,
            options,
            cancel,
            staging: StagingSet::new(started_at),
            branch_cache: HashMap::new(),
            previews: Vec::new(),
        }
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: unreadable source, unresolvable base
    /// branch, transport failure while staging, rejected push, or
    /// cancellation. Recoverable per-target failures are reported in the
    /// [`RunReport`] instead.
    pub fn execute(mut self, entries: &[ConfigEntry]) -> Result<RunReport, SyncError> {
        self.log.stage(&format!(
            "Staging {} entr{} ({} strategy)",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            self.backend.name()
        ));
        let staged = entries.iter().try_for_each(|entry| self.stage_entry(entry));

        if self.options.dry_run {
            staged?;
            return Ok(self.dry_run_report());
        }

        let units = self.staging.into_units();
        if let Err(e) = staged {
            if !units.is_empty() {
                self.log.stage("Cleaning up");
                for unit in &units {
                    // Failures are logged inside; the staging error wins.
                    let _ = publish::release(self.backend, unit, None, self.log);
                }
            }
            return Err(e);
        }

        self.log.stage("Publishing");
        let options = PublishOptions {
            message: &self.options.message,
            parallel: self.options.parallel,
            cancel: &self.cancel,
        };
        let units = publish::converge(self.backend, &units, &options, self.log)?;
        Ok(RunReport { units })
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn branches_of(&mut self, repo: &RepoId) -> Result<&[String], SyncError> {
        if !self.branch_cache.contains_key(repo) {
            let listed = self.backend.list_branches(repo)?;
            self.log
                .debug(&format!("{repo}: {} branch(es)", listed.len()));
            self.branch_cache.insert(repo.clone(), listed);
        }
        Ok(self
            .branch_cache
            .get(repo)
            .map_or(&[][..], Vec::as_slice))
    }

    fn stage_entry(&mut self, entry: &ConfigEntry) -> Result<(), SyncError> {
        self.check_cancelled()?;
        self.log.info(&entry.describe());

        let content = match &entry.action {
            Action::Update(src) => Some(fs::read(src).map_err(|source| SyncError::ReadSource {
                path: src.clone(),
                source,
            })?),
            Action::Delete => None,
        };
        let mutation = content.as_deref().map_or(Mutation::Delete, Mutation::Write);

        let repo = &entry.dest.repo;
        let resolution = {
            let available = self.branches_of(repo)?;
            branches::resolve(available, &entry.branches)
        };
        for pattern in &resolution.unmatched {
            self.log.warn(&format!(
                "{repo}: branch pattern '{pattern}' matched no branch"
            ));
        }
        if resolution.branches.is_empty() {
            self.log
                .warn(&format!("{}: no target branches selected", entry.dest));
        }

        for branch in resolution.branches {
            self.check_cancelled()?;
            let target = TargetBranch::new(repo.clone(), branch);
            if self.options.dry_run {
                self.preview(&target, &entry.dest.path, mutation)?;
            } else {
                self.stage_one(&target, &entry.dest.path, mutation)?;
            }
        }
        Ok(())
    }

    fn stage_one(
        &mut self,
        target: &TargetBranch,
        path: &str,
        mutation: Mutation<'_>,
    ) -> Result<(), SyncError> {
        let unit = self.staging.obtain(self.backend, target)?;
        let changed = self
            .backend
            .apply(unit, path, mutation, &self.options.message)?;
        unit.record(changed);
        match (changed, mutation) {
            (false, _) => self
                .log
                .debug(&format!("{path} already up to date on {target}")),
            (true, Mutation::Write(_)) => self.log.info(&format!("Updated {path} on {target}")),
            (true, Mutation::Delete) => self.log.info(&format!("Deleted {path} on {target}")),
        }
        Ok(())
    }

    fn preview(
        &mut self,
        target: &TargetBranch,
        path: &str,
        mutation: Mutation<'_>,
    ) -> Result<(), SyncError> {
        let current = self.backend.current_digest(target, path)?;
        let would_change = match mutation {
            Mutation::Write(bytes) => !is_noop(current.as_ref(), bytes),
            Mutation::Delete => current.is_some(),
        };
        let slot = match self.previews.iter().position(|(t, _)| t == target) {
            Some(i) => i,
            None => {
                self.previews.push((target.clone(), 0));
                self.previews.len() - 1
            }
        };
        if would_change {
            let verb = match mutation {
                Mutation::Write(_) => "update",
                Mutation::Delete => "delete",
            };
            self.log
                .dry_run(&format!("Would {verb} {path} on {target}"));
            if let Some((_, count)) = self.previews.get_mut(slot) {
                *count += 1;
            }
        } else {
            self.log
                .debug(&format!("{path} already up to date on {target}"));
        }
        Ok(())
    }

    fn dry_run_report(self) -> RunReport {
        let units = self
            .previews
            .into_iter()
            .map(|(target, changes)| {
                let report = UnitReport {
                    target,
                    changes,
                    outcome: if changes == 0 {
                        TargetOutcome::Unchanged
                    } else {
                        TargetOutcome::DryRun { changes }
                    },
                    cleanup: None,
                };
                publish::record(self.log, &report);
                report
            })
            .collect();
        RunReport { units }
    }
}
