//! Continuity state tracked alongside a branch body.

use super::world::Importance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How serious a continuity problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
}

/// A statement the story has asserted as true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub statement: String,
    /// 0.0-1.0.
    pub confidence: f32,
    /// Where the fact was established (branch id, chapter, etc).
    pub source: String,
    /// Ids of characters, locations or items the fact concerns.
    pub related: Vec<String>,
}

impl Fact {
    pub fn new(id: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            confidence: 1.0,
            source: String::new(),
            related: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Two facts that cannot both hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub id: String,
    pub fact_a: String,
    pub fact_b: String,
    pub severity: Severity,
    pub resolution: Option<String>,
}

/// Snapshot of the emotional register of the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub primary_emotion: String,
    /// 0.0-1.0.
    pub intensity: f32,
    pub secondary_emotions: Vec<String>,
    /// Character id → current emotion.
    pub character_emotions: BTreeMap<String, String>,
    pub atmosphere: String,
}

impl Default for EmotionalContext {
    fn default() -> Self {
        Self {
            primary_emotion: "neutral".to_string(),
            intensity: 0.5,
            secondary_emotions: Vec::new(),
            character_emotions: BTreeMap::new(),
            atmosphere: "calm".to_string(),
        }
    }
}

/// Lifecycle of a plot thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Introduced,
    Developing,
    Complicated,
    Resolving,
    Resolved,
}

impl ThreadStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, ThreadStatus::Resolved)
    }
}

/// A tracked narrative obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotThread {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ThreadStatus,
    pub importance: Importance,
    pub related_characters: Vec<String>,
    pub introduced_in: String,
    pub resolved_in: Option<String>,
}

impl PlotThread {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: ThreadStatus::Introduced,
            importance: Importance::Moderate,
            related_characters: Vec::new(),
            introduced_in: String::new(),
            resolved_in: None,
        }
    }

    pub fn with_status(mut self, status: ThreadStatus) -> Self {
        self.status = status;
        self
    }
}

/// A hint planted for a later payoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foreshadowing {
    pub id: String,
    pub hint: String,
    pub payoff: Option<String>,
    /// 0.0-1.0.
    pub subtlety: f32,
    pub planted_in: String,
    pub paid_off_in: Option<String>,
}

/// A reference back to an earlier element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callback {
    pub id: String,
    pub original_element: String,
    pub original_location: String,
    pub callback_text: String,
    /// How the callback lands: humor, drama, irony or nostalgia.
    pub callback_kind: String,
}

/// Everything the continuity engine tracks for a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityState {
    pub facts: Vec<Fact>,
    pub contradictions: Vec<Contradiction>,
    pub emotional_context: EmotionalContext,
    /// 0.0-10.0.
    pub narrative_tension: f32,
    pub plot_threads: Vec<PlotThread>,
    pub foreshadowing: Vec<Foreshadowing>,
    pub callbacks: Vec<Callback>,
    /// 0-100.
    pub consistency_score: u8,
}

impl Default for ContinuityState {
    fn default() -> Self {
        Self {
            facts: Vec::new(),
            contradictions: Vec::new(),
            emotional_context: EmotionalContext::default(),
            narrative_tension: 5.0,
            plot_threads: Vec::new(),
            foreshadowing: Vec::new(),
            callbacks: Vec::new(),
            consistency_score: 100,
        }
    }
}

impl ContinuityState {
    /// Record a fact.
    pub fn assert_fact(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn set_tension(&mut self, tension: f32) {
        self.narrative_tension = tension.clamp(0.0, 10.0);
    }

    /// Threads that have not been resolved.
    pub fn open_threads(&self) -> impl Iterator<Item = &PlotThread> {
        self.plot_threads.iter().filter(|t| t.status.is_open())
    }

    pub fn thread(&self, id: &str) -> Option<&PlotThread> {
        self.plot_threads.iter().find(|t| t.id == id)
    }
}
