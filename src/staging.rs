//! Staging units and their per-run memoization.
//!
//! A staging unit is the isolated place where changes for one target branch
//! accumulate before they are published. [`StagingSet`] guarantees at most
//! one unit per `(owner, repo, branch)` per run.
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};

use crate::backend::StagingBackend;
use crate::branches::staging_branch_name;
use crate::error::SyncError;
use crate::github::RepoId;

/// A concrete branch a config entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetBranch {
    /// Repository holding the branch.
    pub repo: RepoId,
    /// Branch name.
    pub branch: String,
}

impl TargetBranch {
    /// Build a target.
    #[must_use]
    pub fn new(repo: RepoId, branch: impl Into<String>) -> Self {
        Self {
            repo,
            branch: branch.into(),
        }
    }
}

impl std::fmt::Display for TargetBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repo, self.branch)
    }
}

/// Isolated holding area for one target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingUnit {
    /// Branch the staged work converges onto.
    pub target: TargetBranch,
    /// Name of the staging branch.
    pub staging_name: String,
    /// When the unit was created.
    pub created_at: DateTime<Utc>,
    /// Whether at least one real change has been staged.
    pub has_change: bool,
    /// Number of real changes staged.
    pub changes: usize,
}

impl StagingUnit {
    /// Record the outcome of one mutation.
    pub const fn record(&mut self, changed: bool) {
        if changed {
            self.has_change = true;
            self.changes += 1;
        }
    }
}

/// Every staging unit created in a run, keyed by target.
#[derive(Debug)]
pub struct StagingSet {
    started_at: DateTime<Utc>,
    units: HashMap<TargetBranch, StagingUnit>,
    order: Vec<TargetBranch>,
}

impl StagingSet {
    /// Empty set for a run started at `started_at`; the timestamp seeds
    /// every staging branch name of the run.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            units: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Return the unit for `target`, asking `backend` to create it on first
    /// use.
    ///
    /// # Errors
    ///
    /// Propagates the backend's failure to create the unit; nothing is
    /// recorded in that case.
    pub fn obtain<B: StagingBackend + ?Sized>(
        &mut self,
        backend: &B,
        target: &TargetBranch,
    ) -> Result<&mut StagingUnit, SyncError> {
        match self.units.entry(target.clone()) {
            Entry::Occupied(unit) => Ok(unit.into_mut()),
            Entry::Vacant(slot) => {
                let staging_name =
                    staging_branch_name(self.started_at.timestamp(), &target.branch);
                backend.create_unit(target, &staging_name)?;
                self.order.push(target.clone());
                Ok(slot.insert(StagingUnit {
                    target: target.clone(),
                    staging_name,
                    created_at: Utc::now(),
                    has_change: false,
                    changes: 0,
                }))
            }
        }
    }

    /// Units with at least one staged change, in creation order.
    pub fn pending(&self) -> impl Iterator<Item = &StagingUnit> {
        self.created().filter(|u| u.has_change)
    }

    /// Every unit created in the run, in creation order.
    pub fn created(&self) -> impl Iterator<Item = &StagingUnit> {
        self.order.iter().filter_map(|t| self.units.get(t))
    }

    /// Number of units created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no unit was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Consume the set, yielding its units in creation order.
    #[must_use]
    pub fn into_units(mut self) -> Vec<StagingUnit> {
        self.order
            .iter()
            .filter_map(|t| self.units.remove(t))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::test_helpers::RecordingBackend;

    fn target(branch: &str) -> TargetBranch {
        TargetBranch::new(RepoId::new("acme", "widgets"), branch)
    }

    fn started() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn obtain_creates_once_per_target() {
        let backend = RecordingBackend::new();
        let mut set = StagingSet::new(started());

        set.obtain(&backend, &target("main")).unwrap().record(true);
        let again = set.obtain(&backend, &target("main")).unwrap();
        assert!(again.has_change, "second obtain must return the same unit");
        set.obtain(&backend, &target("release")).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(
            backend.created(),
            vec![
                "sync/t_1700000000/main".to_string(),
                "sync/t_1700000000/release".to_string()
            ]
        );
    }

    #[test]
    fn failed_creation_records_nothing() {
        let backend = RecordingBackend::new().failing_create("main");
        let mut set = StagingSet::new(started());
        assert!(set.obtain(&backend, &target("main")).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn pending_keeps_creation_order_and_skips_unchanged() {
        let backend = RecordingBackend::new();
        let mut set = StagingSet::new(started());
        for branch in ["c", "a", "b"] {
            set.obtain(&backend, &target(branch)).unwrap();
        }
        set.obtain(&backend, &target("b")).unwrap().record(true);
        set.obtain(&backend, &target("c")).unwrap().record(true);

        let pending: Vec<&str> = set.pending().map(|u| u.target.branch.as_str()).collect();
        assert_eq!(pending, vec!["c", "b"]);
        let all: Vec<String> = set.into_units().into_iter().map(|u| u.target.branch).collect();
        assert_eq!(all, vec!["c", "a", "b"]);
    }

    #[test]
    fn record_counts_only_real_changes() {
        let backend = RecordingBackend::new();
        let mut set = StagingSet::new(started());
        let unit = set.obtain(&backend, &target("main")).unwrap();
        unit.record(false);
        assert!(!unit.has_change);
        unit.record(true);
        unit.record(true);
        assert_eq!(unit.changes, 2);
    }
}
