//! Validation report and the issue records it carries.

use crate::branch::{Branch, BranchId, Contradiction, Severity};
use serde::{Deserialize, Serialize};

/// What a consistency error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fact,
    World,
    Plot,
}

/// A detected inconsistency with the reference branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyError {
    pub kind: ErrorKind,
    pub description: String,
    pub severity: Severity,
    /// Id of the fact, event or thread involved.
    pub location: Option<String>,
    pub suggested_fix: Option<String>,
}

/// An unresolved obligation the reference carried that the branch dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotHole {
    pub thread_id: String,
    pub description: String,
    pub severity: Severity,
}

/// A character whose state regressed impossibly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInconsistency {
    pub character_id: String,
    pub inconsistency: String,
    /// Reference branch first, then the validated branch.
    pub branches: Vec<BranchId>,
    pub suggested_fix: String,
}

/// Two events whose order runs backwards across the branch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConflict {
    /// Last event of the reference.
    pub reference_event: String,
    /// First introduced event of the branch.
    pub branch_event: String,
    pub conflict: String,
    pub resolution: String,
}

/// Advisory follow-up derived from the detected issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// plot, character, timeline or fact.
    pub area: String,
    pub text: String,
}

/// Outcome of validating a branch against a reference.
///
/// A low score is a valid result, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub branch_id: BranchId,
    /// 0-100.
    pub continuity_score: u8,
    pub consistency_errors: Vec<ConsistencyError>,
    pub plot_holes: Vec<PlotHole>,
    pub character_inconsistencies: Vec<CharacterInconsistency>,
    pub timeline_conflicts: Vec<TimelineConflict>,
    pub contradictions: Vec<Contradiction>,
    pub suggestions: Vec<Suggestion>,
    /// 0-100.
    pub overall_quality: u8,
}

impl ValidationReport {
    /// A report with no issues and a perfect score.
    pub fn clean(branch_id: BranchId, overall_quality: u8) -> Self {
        Self {
            branch_id,
            continuity_score: 100,
            consistency_errors: Vec::new(),
            plot_holes: Vec::new(),
            character_inconsistencies: Vec::new(),
            timeline_conflicts: Vec::new(),
            contradictions: Vec::new(),
            suggestions: Vec::new(),
            overall_quality,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    pub fn issue_count(&self) -> usize {
        self.consistency_errors.len()
            + self.plot_holes.len()
            + self.character_inconsistencies.len()
            + self.timeline_conflicts.len()
    }

    /// Whether any consistency error is major or worse.
    pub fn has_major_errors(&self) -> bool {
        self.consistency_errors
            .iter()
            .any(|e| e.severity >= Severity::Major)
    }

    /// Pessimistic combination of two validations of the same branch.
    ///
    /// Score is the minimum; issue lists are the union with duplicates removed.
    pub fn combine(mut self, other: ValidationReport) -> Self {
        self.continuity_score = self.continuity_score.min(other.continuity_score);
        self.overall_quality = self.overall_quality.min(other.overall_quality);
        union_into(&mut self.consistency_errors, other.consistency_errors);
        union_into(&mut self.plot_holes, other.plot_holes);
        union_into(
            &mut self.character_inconsistencies,
            other.character_inconsistencies,
        );
        union_into(&mut self.timeline_conflicts, other.timeline_conflicts);
        union_into(&mut self.contradictions, other.contradictions);
        union_into(&mut self.suggestions, other.suggestions);
        self
    }

    /// Store the score and any newly detected contradictions on `branch`.
    pub fn apply_to(&self, branch: &mut Branch) {
        branch.continuity.consistency_score = self.continuity_score;
        for contradiction in &self.contradictions {
            let known = branch
                .continuity
                .contradictions
                .iter()
                .any(|c| c.id == contradiction.id);
            if !known {
                branch.continuity.contradictions.push(contradiction.clone());
            }
        }
    }
}

fn union_into<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}
