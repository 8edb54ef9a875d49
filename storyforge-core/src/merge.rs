//! Merge strategies and the pure state combinators behind them.

use crate::branch::{CharacterStatus, ContinuityState, WorldState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How two branches are combined into a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Conflict markers around both bodies; the target's world is kept.
    Manual,
    /// Bodies concatenated target first; world maps unioned, target wins.
    Auto,
    /// `Auto` plus reconciliation of dead/alive conflicts to `Unknown`.
    Smart,
}

impl MergeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            MergeStrategy::Manual => "manual",
            MergeStrategy::Auto => "auto",
            MergeStrategy::Smart => "smart",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(MergeStrategy::Manual),
            "auto" => Ok(MergeStrategy::Auto),
            "smart" => Ok(MergeStrategy::Smart),
            other => Err(format!("Unknown merge strategy: {other}")),
        }
    }
}

/// Body of a merged branch.
pub fn merge_bodies(target: &str, source: &str, strategy: MergeStrategy) -> String {
    match strategy {
        MergeStrategy::Manual => {
            format!("<<<<<<< TARGET\n{target}\n=======\n{source}\n>>>>>>> SOURCE")
        }
        MergeStrategy::Auto | MergeStrategy::Smart => format!("{target}\n\n{source}"),
    }
}

/// World state of a merged branch.
pub fn merge_worlds(target: &WorldState, source: &WorldState, strategy: MergeStrategy) -> WorldState {
    let mut merged = target.clone();
    if strategy == MergeStrategy::Manual {
        return merged;
    }

    merged.characters.union_keep_existing(&source.characters);
    merged.locations.union_keep_existing(&source.locations);
    merged.inventory.union_keep_existing(&source.inventory);
    for (key, value) in &source.flags {
        merged
            .flags
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    for event in &source.timeline {
        if !merged.timeline.iter().any(|e| e.id == event.id) {
            merged.timeline.push(event.clone());
        }
    }
    // Stable, so same-timestamp events keep target-then-source order.
    merged.timeline.sort_by_key(|e| e.timestamp);

    merged.decisions.extend(source.decisions.iter().cloned());

    if strategy == MergeStrategy::Smart {
        reconcile_statuses(&mut merged, target, source);
    }
    merged
}

/// Mark characters that are dead on one side and alive on the other as
/// `Unknown`. Neither side is preferred.
fn reconcile_statuses(merged: &mut WorldState, target: &WorldState, source: &WorldState) {
    for (id, character) in merged.characters.iter_mut() {
        let (Some(t), Some(s)) = (target.characters.get(id), source.characters.get(id)) else {
            continue;
        };
        let conflicting = matches!(
            (t.status, s.status),
            (CharacterStatus::Dead, CharacterStatus::Alive)
                | (CharacterStatus::Alive, CharacterStatus::Dead)
        );
        if conflicting {
            character.status = CharacterStatus::Unknown;
        }
    }
}

/// Continuity state of a merged branch: target first, then anything new from
/// the source.
pub fn merge_continuity(
    target: &ContinuityState,
    source: &ContinuityState,
    strategy: MergeStrategy,
) -> ContinuityState {
    let mut merged = target.clone();
    if strategy == MergeStrategy::Manual {
        return merged;
    }

    for fact in &source.facts {
        if !merged.facts.iter().any(|f| f.id == fact.id) {
            merged.facts.push(fact.clone());
        }
    }
    for thread in &source.plot_threads {
        if merged.thread(&thread.id).is_none() {
            merged.plot_threads.push(thread.clone());
        }
    }
    for hint in &source.foreshadowing {
        if !merged.foreshadowing.iter().any(|f| f.id == hint.id) {
            merged.foreshadowing.push(hint.clone());
        }
    }
    for callback in &source.callbacks {
        if !merged.callbacks.iter().any(|c| c.id == callback.id) {
            merged.callbacks.push(callback.clone());
        }
    }
    merged.narrative_tension = target.narrative_tension.max(source.narrative_tension);
    merged
}
