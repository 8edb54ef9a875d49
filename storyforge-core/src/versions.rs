//! Bounded per-branch snapshot history.

use crate::branch::{Branch, BranchId};
use crate::error::{StoryError, StoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default number of snapshots kept per branch.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 50;

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    /// The branch was created or mutated.
    Mutation,
    /// State captured just before a rollback.
    Rollback,
}

/// An immutable copy of a branch at one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The branch version this snapshot holds.
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub reason: SnapshotReason,
    pub branch: Branch,
}

/// Summary of one retained snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub reason: SnapshotReason,
    pub title: String,
    pub word_count: usize,
}

/// Append-only snapshot ledger.
///
/// Never touches the branch store; the manager decides what to do with a
/// historical state.
#[derive(Debug)]
pub struct VersionControl {
    logs: HashMap<BranchId, VecDeque<Snapshot>>,
    limit: usize,
}

impl Default for VersionControl {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_LIMIT)
    }
}

impl VersionControl {
    /// Create a ledger keeping at most `limit` snapshots per branch.
    pub fn new(limit: usize) -> Self {
        Self {
            logs: HashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record a deep copy of `branch`, evicting the oldest entry on overflow.
    pub fn snapshot(&mut self, branch: &Branch) {
        self.push(branch, SnapshotReason::Mutation);
    }

    fn push(&mut self, branch: &Branch, reason: SnapshotReason) {
        let log = self.logs.entry(branch.id).or_default();
        log.push_back(Snapshot {
            version: branch.version,
            taken_at: Utc::now(),
            reason,
            branch: branch.clone(),
        });
        while log.len() > self.limit {
            log.pop_front();
        }
    }

    /// Look up the retained snapshot of `version`.
    ///
    /// Versions are 1-based. Version 0, versions never recorded and versions
    /// already evicted are all `NotFound`. When a version appears more than
    /// once (a rollback marker), the most recent entry wins.
    pub fn get_snapshot(&self, id: &BranchId, version: u32) -> StoryResult<&Snapshot> {
        if version == 0 {
            return Err(StoryError::version_not_found(*id, version));
        }
        self.logs
            .get(id)
            .and_then(|log| log.iter().rev().find(|s| s.version == version))
            .ok_or_else(|| StoryError::version_not_found(*id, version))
    }

    /// Retained versions of a branch, oldest first.
    pub fn list_versions(&self, id: &BranchId) -> Vec<VersionInfo> {
        self.logs
            .get(id)
            .map(|log| {
                log.iter()
                    .map(|s| VersionInfo {
                        version: s.version,
                        taken_at: s.taken_at,
                        reason: s.reason,
                        title: s.branch.title.clone(),
                        word_count: s.branch.metadata.word_count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of snapshots retained for a branch.
    pub fn len(&self, id: &BranchId) -> usize {
        self.logs.get(id).map(VecDeque::len).unwrap_or(0)
    }

    /// Capture `current` and return the historical state at `version`.
    ///
    /// The capture happens first, so the rollback itself can be undone.
    pub fn rollback(&mut self, current: &Branch, version: u32) -> StoryResult<Branch> {
        let historical = self.get_snapshot(&current.id, version)?.branch.clone();
        self.push(current, SnapshotReason::Rollback);
        Ok(historical)
    }

    /// Every retained snapshot, for archiving.
    pub fn export(&self) -> Vec<Snapshot> {
        let mut all: Vec<Snapshot> = self.logs.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        all
    }

    /// Restore snapshots written by [`VersionControl::export`].
    pub fn import(&mut self, snapshots: Vec<Snapshot>) {
        for snapshot in snapshots {
            let log = self.logs.entry(snapshot.branch.id).or_default();
            log.push_back(snapshot);
            while log.len() > self.limit {
                log.pop_front();
            }
        }
    }
}
