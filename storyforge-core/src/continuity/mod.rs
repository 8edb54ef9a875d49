//! Continuity engine.
//!
//! Compares a branch against a reference branch (its parent, or each input of
//! a merge) and reports what no longer adds up. Detected problems are data in
//! a [`ValidationReport`]; nothing here fails.

mod facts;
mod report;

pub use facts::facts_contradict;
pub use report::{
    CharacterInconsistency, ConsistencyError, ErrorKind, PlotHole, Suggestion, TimelineConflict,
    ValidationReport,
};

use crate::branch::{Branch, CharacterStatus, Contradiction, Severity};
use std::collections::HashSet;
use tracing::debug;

const ERROR_WEIGHT: i32 = 5;
const PLOT_HOLE_WEIGHT: i32 = 10;
const CHARACTER_WEIGHT: i32 = 7;
const TIMELINE_WEIGHT: i32 = 8;

/// Confidence at or above which a contradicted fact counts as a major error.
const MAJOR_FACT_CONFIDENCE: f32 = 0.8;

/// Stateless continuity validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityEngine;

impl ContinuityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate `branch` against `reference`.
    pub fn validate(&self, branch: &Branch, reference: &Branch) -> ValidationReport {
        let character_inconsistencies = self.check_characters(branch, reference);
        let timeline_conflicts = self.check_timeline(branch, reference);
        let (contradictions, mut consistency_errors) = self.check_facts(branch, reference);
        let plot_holes = self.check_threads(branch, reference);

        // A fact the branch asserts twice yields one entry.
        consistency_errors.dedup();

        let score = continuity_score(
            consistency_errors.len(),
            plot_holes.len(),
            character_inconsistencies.len(),
            timeline_conflicts.len(),
        );

        let mut report = ValidationReport {
            branch_id: branch.id,
            continuity_score: score,
            consistency_errors,
            plot_holes,
            character_inconsistencies,
            timeline_conflicts,
            contradictions,
            suggestions: Vec::new(),
            overall_quality: self.quality(branch, score),
        };
        report.suggestions = suggestions_for(&report);

        debug!(
            branch = %branch.id,
            reference = %reference.id,
            score = report.continuity_score,
            issues = report.issue_count(),
            "Validated branch"
        );
        report
    }

    /// Validate a merge result against both of its inputs.
    ///
    /// The score is the lower of the two; the issue lists are unioned.
    pub fn validate_merge(
        &self,
        merged: &Branch,
        source: &Branch,
        target: &Branch,
    ) -> ValidationReport {
        let against_source = self.validate(merged, source);
        let against_target = self.validate(merged, target);
        against_source.combine(against_target)
    }

    /// Overall quality of a branch given its continuity score.
    pub fn quality(&self, branch: &Branch, continuity_score: u8) -> u8 {
        let words = (branch.metadata.word_count as f64 / 100.0).min(20.0);
        let consistency = continuity_score as f64 * 0.2;
        let characters = (branch.world.characters.len() as f64 * 2.0).min(10.0);
        let threads = (branch.continuity.open_threads().count() as f64).min(10.0);
        (50.0 + words + consistency + characters + threads).clamp(0.0, 100.0) as u8
    }

    /// Append a visible note for every consistency error that carries a fix.
    ///
    /// Existing text is never touched. Returns `None` when nothing was added.
    pub fn annotate(&self, body: &str, report: &ValidationReport) -> Option<String> {
        let notes: Vec<&str> = report
            .consistency_errors
            .iter()
            .filter_map(|e| e.suggested_fix.as_deref())
            .collect();
        if notes.is_empty() {
            return None;
        }

        let mut annotated = body.to_string();
        for note in notes {
            annotated.push_str("\n\n[Continuity note: ");
            annotated.push_str(note);
            annotated.push(']');
        }
        Some(annotated)
    }

    fn check_characters(&self, branch: &Branch, reference: &Branch) -> Vec<CharacterInconsistency> {
        branch
            .world
            .characters
            .iter()
            .filter_map(|(id, character)| {
                let before = reference.world.characters.get(id)?;
                (before.status == CharacterStatus::Dead
                    && character.status == CharacterStatus::Alive)
                    .then(|| CharacterInconsistency {
                        character_id: id.clone(),
                        inconsistency: format!(
                            "{} is alive again without explanation",
                            character.name
                        ),
                        branches: vec![reference.id, branch.id],
                        suggested_fix: "Explain the return or keep the character dead"
                            .to_string(),
                    })
            })
            .collect()
    }

    /// Only events the reference does not already carry are compared, so a
    /// child that inherited its parent's timeline is not flagged for it.
    fn check_timeline(&self, branch: &Branch, reference: &Branch) -> Vec<TimelineConflict> {
        let Some(last) = reference.world.last_event() else {
            return Vec::new();
        };
        let known: HashSet<&str> = reference
            .world
            .timeline
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        let first_new = branch
            .world
            .timeline
            .iter()
            .filter(|e| !known.contains(e.id.as_str()))
            .min_by_key(|e| e.timestamp);

        match first_new {
            Some(first) if first.timestamp < last.timestamp => vec![TimelineConflict {
                reference_event: last.id.clone(),
                branch_event: first.id.clone(),
                conflict: format!(
                    "'{}' happens before '{}', which the story already reached",
                    first.description, last.description
                ),
                resolution: "Move the event after the earlier story's last event".to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn check_facts(
        &self,
        branch: &Branch,
        reference: &Branch,
    ) -> (Vec<Contradiction>, Vec<ConsistencyError>) {
        let mut contradictions = Vec::new();
        let mut errors = Vec::new();

        for fact in &branch.continuity.facts {
            for earlier in &reference.continuity.facts {
                if !facts_contradict(&fact.statement, &earlier.statement) {
                    continue;
                }
                let severity = if earlier.confidence >= MAJOR_FACT_CONFIDENCE {
                    Severity::Major
                } else {
                    Severity::Moderate
                };
                let fix = format!(
                    "Reconcile \"{}\" with \"{}\" or explain the change",
                    fact.statement, earlier.statement
                );
                contradictions.push(Contradiction {
                    id: format!("contradiction_{}_{}", earlier.id, fact.id),
                    fact_a: earlier.id.clone(),
                    fact_b: fact.id.clone(),
                    severity,
                    resolution: Some(fix.clone()),
                });
                errors.push(ConsistencyError {
                    kind: ErrorKind::Fact,
                    description: format!(
                        "\"{}\" contradicts \"{}\"",
                        fact.statement, earlier.statement
                    ),
                    severity,
                    location: Some(fact.id.clone()),
                    suggested_fix: Some(fix),
                });
            }
        }

        (contradictions, errors)
    }

    fn check_threads(&self, branch: &Branch, reference: &Branch) -> Vec<PlotHole> {
        reference
            .continuity
            .open_threads()
            .filter(|t| branch.continuity.thread(&t.id).is_none())
            .map(|t| PlotHole {
                thread_id: t.id.clone(),
                description: format!("Open thread '{}' was dropped", t.name),
                severity: Severity::Moderate,
            })
            .collect()
    }
}

fn continuity_score(errors: usize, plot_holes: usize, characters: usize, timeline: usize) -> u8 {
    let penalty = ERROR_WEIGHT * errors as i32
        + PLOT_HOLE_WEIGHT * plot_holes as i32
        + CHARACTER_WEIGHT * characters as i32
        + TIMELINE_WEIGHT * timeline as i32;
    (100 - penalty).clamp(0, 100) as u8
}

fn suggestions_for(report: &ValidationReport) -> Vec<Suggestion> {
    let mut out = Vec::new();
    for c in &report.character_inconsistencies {
        out.push(Suggestion {
            area: "character".to_string(),
            text: format!("{}: {}", c.character_id, c.suggested_fix),
        });
    }
    for t in &report.timeline_conflicts {
        out.push(Suggestion {
            area: "timeline".to_string(),
            text: t.resolution.clone(),
        });
    }
    for h in &report.plot_holes {
        out.push(Suggestion {
            area: "plot".to_string(),
            text: format!("Carry or resolve thread '{}'", h.thread_id),
        });
    }
    if !report.contradictions.is_empty() {
        out.push(Suggestion {
            area: "fact".to_string(),
            text: format!(
                "Review {} contradicted fact(s)",
                report.contradictions.len()
            ),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{
        AuthorId, Character, ContinuityState, Fact, MetadataHints, PlotThread, ThreadStatus,
        TimelineEvent, WorldState,
    };

    fn branch(body: &str) -> Branch {
        Branch::assemble(
            AuthorId::new("ada"),
            "Test",
            body,
            &MetadataHints::default(),
            None,
            WorldState::default(),
            ContinuityState::default(),
            200,
        )
    }

    #[test]
    fn test_identical_state_is_clean() {
        let parent = branch("A quiet start.");
        let child = parent.clone();
        let report = ContinuityEngine::new().validate(&child, &parent);
        assert!(report.is_clean());
        assert_eq!(report.continuity_score, 100);
    }

    #[test]
    fn test_resurrection_is_flagged() {
        let mut parent = branch("The end of Mira.");
        parent.world.characters.insert(
            "mira",
            Character::new("mira", "Mira").with_status(CharacterStatus::Dead),
        );
        let mut child = parent.clone();
        if let Some(mira) = child.world.characters.get_mut("mira") {
            mira.status = CharacterStatus::Alive;
        }

        let report = ContinuityEngine::new().validate(&child, &parent);
        assert_eq!(report.character_inconsistencies.len(), 1);
        assert_eq!(report.continuity_score, 93);
        assert_eq!(report.suggestions[0].area, "character");
    }

    #[test]
    fn test_other_status_changes_are_allowed() {
        let mut parent = branch("Before.");
        parent
            .world
            .characters
            .insert("tomas", Character::new("tomas", "Tomas"));
        let mut child = parent.clone();
        if let Some(tomas) = child.world.characters.get_mut("tomas") {
            tomas.status = CharacterStatus::Dead;
        }

        let report = ContinuityEngine::new().validate(&child, &parent);
        assert!(report.character_inconsistencies.is_empty());
    }

    #[test]
    fn test_timeline_running_backwards() {
        let mut parent = branch("Day two.");
        parent.world.record_event(TimelineEvent::new("e1", 10, "arrival"));
        parent.world.record_event(TimelineEvent::new("e2", 20, "feast"));

        let mut child = parent.clone();
        child.world.record_event(TimelineEvent::new("e3", 30, "duel"));
        let ok = ContinuityEngine::new().validate(&child, &parent);
        assert!(ok.timeline_conflicts.is_empty());

        child.world.record_event(TimelineEvent::new("e0", 5, "prophecy"));
        let report = ContinuityEngine::new().validate(&child, &parent);
        assert_eq!(report.timeline_conflicts.len(), 1);
        assert_eq!(report.timeline_conflicts[0].branch_event, "e0");
        assert_eq!(report.continuity_score, 92);
    }

    #[test]
    fn test_fact_contradiction_is_recorded() {
        let mut parent = branch("The bridge.");
        parent
            .continuity
            .assert_fact(Fact::new("f1", "The bridge is standing"));
        let mut child = parent.clone();
        child
            .continuity
            .assert_fact(Fact::new("f2", "The bridge is not standing"));

        let report = ContinuityEngine::new().validate(&child, &parent);
        assert_eq!(report.contradictions.len(), 1);
        assert_eq!(report.consistency_errors.len(), 1);
        assert_eq!(report.consistency_errors[0].severity, Severity::Major);
        assert!(report.has_major_errors());
        assert_eq!(report.continuity_score, 95);
    }

    #[test]
    fn test_low_confidence_fact_is_moderate() {
        let mut parent = branch("Rumours.");
        parent
            .continuity
            .assert_fact(Fact::new("f1", "The duke is loyal").with_confidence(0.4));
        let mut child = parent.clone();
        child
            .continuity
            .assert_fact(Fact::new("f2", "The duke isn't loyal"));

        let report = ContinuityEngine::new().validate(&child, &parent);
        assert_eq!(report.consistency_errors[0].severity, Severity::Moderate);
        assert!(!report.has_major_errors());
    }

    #[test]
    fn test_dropped_thread_is_plot_hole() {
        let mut parent = branch("Setup.");
        parent
            .continuity
            .plot_threads
            .push(PlotThread::new("heist", "The Heist"));
        parent
            .continuity
            .plot_threads
            .push(PlotThread::new("old", "Old news").with_status(ThreadStatus::Resolved));
        let mut child = parent.clone();
        child.continuity.plot_threads.clear();

        let report = ContinuityEngine::new().validate(&child, &parent);
        assert_eq!(report.plot_holes.len(), 1);
        assert_eq!(report.continuity_score, 90);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(continuity_score(30, 0, 0, 0), 0);
        assert_eq!(continuity_score(1, 1, 1, 1), 70);
    }

    #[test]
    fn test_quality_bonuses_are_bounded() {
        let mut b = branch(&vec!["word"; 5000].join(" "));
        for i in 0..8 {
            let id = format!("c{i}");
            b.world
                .characters
                .insert(id.clone(), Character::new(id, "Someone"));
        }
        for i in 0..15 {
            b.continuity
                .plot_threads
                .push(PlotThread::new(format!("t{i}"), "Thread"));
        }
        // 50 + 20 + 20 + 10 + 10
        assert_eq!(ContinuityEngine::new().quality(&b, 100), 100);
        assert_eq!(ContinuityEngine::new().quality(&branch(""), 0), 50);
    }

    #[test]
    fn test_annotate_appends_only() {
        let mut parent = branch("The bridge.");
        parent
            .continuity
            .assert_fact(Fact::new("f1", "The bridge is standing"));
        let mut child = parent.clone();
        child
            .continuity
            .assert_fact(Fact::new("f2", "The bridge is no longer standing"));
        let report = ContinuityEngine::new().validate(&child, &parent);

        let annotated = ContinuityEngine::new()
            .annotate("It fell.", &report)
            .unwrap();
        assert!(annotated.starts_with("It fell.\n\n[Continuity note: "));
        assert!(annotated.ends_with(']'));

        let clean = ValidationReport::clean(child.id, 50);
        assert!(ContinuityEngine::new().annotate("It fell.", &clean).is_none());
    }

    #[test]
    fn test_merge_takes_minimum() {
        let mut source = branch("Source.");
        source.world.characters.insert(
            "c",
            Character::new("c", "Cora").with_status(CharacterStatus::Dead),
        );
        let mut target = branch("Target.");
        target.world.characters.insert("c", Character::new("c", "Cora"));

        let merged = target.clone();
        let report = ContinuityEngine::new().validate_merge(&merged, &source, &target);
        assert_eq!(report.continuity_score, 93);
        assert_eq!(report.character_inconsistencies.len(), 1);
    }
}
