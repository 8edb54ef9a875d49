//! Inputs to a generation: where the story stands and how to write the next part.

use super::template::NarrativeTemplate;
use crate::branch::{Branch, Character, PlotThread, ThreadStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse position of a branch in its story arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotStage {
    Setup,
    Rising,
    Climax,
    Falling,
    Resolution,
}

impl PlotStage {
    /// Stage implied by a branch's length and tension.
    ///
    /// Checked in order: short text is setup, very high tension is climax,
    /// long text at low tension is resolution, moderate-low tension is falling.
    pub fn derive(word_count: usize, tension: f32) -> Self {
        if word_count < 500 {
            PlotStage::Setup
        } else if tension > 8.0 {
            PlotStage::Climax
        } else if tension < 3.0 && word_count > 2000 {
            PlotStage::Resolution
        } else if tension < 5.0 {
            PlotStage::Falling
        } else {
            PlotStage::Rising
        }
    }

    pub fn of_branch(branch: &Branch) -> Self {
        Self::derive(
            branch.metadata.word_count,
            branch.continuity.narrative_tension,
        )
    }

    /// Stage a new branch should aim for, given the state of its threads.
    pub fn next_from_threads(threads: &[PlotThread]) -> Self {
        let unresolved = threads.iter().filter(|t| t.status.is_open()).count();
        let developing = threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Developing)
            .count();

        if unresolved == 0 {
            PlotStage::Resolution
        } else if developing > 3 {
            PlotStage::Climax
        } else if unresolved > 5 {
            PlotStage::Rising
        } else {
            PlotStage::Falling
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlotStage::Setup => "setup",
            PlotStage::Rising => "rising",
            PlotStage::Climax => "climax",
            PlotStage::Falling => "falling",
            PlotStage::Resolution => "resolution",
        }
    }
}

impl fmt::Display for PlotStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target length of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LengthTier {
    Micro,
    Short,
    #[default]
    Medium,
    Long,
    Epic,
}

impl LengthTier {
    pub fn target_words(&self) -> usize {
        match self {
            LengthTier::Micro => 100,
            LengthTier::Short => 500,
            LengthTier::Medium => 1500,
            LengthTier::Long => 5000,
            LengthTier::Epic => 10000,
        }
    }
}

/// How a continuation relates to the branch it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationMode {
    /// Pick up where the text stops.
    Continue,
    /// Head toward the next stage the plot threads call for.
    Branch,
    /// Retell with the opposite tone.
    Alternate,
}

/// Kind of ending requested from a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ending {
    Happy,
    #[default]
    Bittersweet,
    Tragic,
    Ambiguous,
    Twist,
}

impl Ending {
    pub fn name(&self) -> &'static str {
        match self {
            Ending::Happy => "happy",
            Ending::Bittersweet => "bittersweet",
            Ending::Tragic => "tragic",
            Ending::Ambiguous => "ambiguous",
            Ending::Twist => "twist",
        }
    }
}

/// Tone that reads as the opposite of `tone`; `neutral` when none is known.
pub fn alternative_tone(tone: &str) -> &'static str {
    match tone {
        "dark" => "light",
        "light" => "dark",
        "serious" => "humorous",
        "humorous" => "serious",
        "satirical" => "sincere",
        "whimsical" => "gritty",
        "gritty" => "whimsical",
        "romantic" => "cynical",
        "cynical" => "romantic",
        "melancholic" => "hopeful",
        "hopeful" => "melancholic",
        "mysterious" => "revealing",
        "tense" => "relaxed",
        "relaxed" => "tense",
        "epic" => "intimate",
        "intimate" => "epic",
        "surreal" => "realistic",
        "realistic" => "surreal",
        "fantastical" => "mundane",
        _ => "neutral",
    }
}

/// Where the story stands.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeContext {
    pub previous_events: Vec<String>,
    pub active_characters: Vec<Character>,
    pub location: String,
    pub emotional_tone: String,
    /// 0-10.
    pub tension: f32,
    pub plot_stage: PlotStage,
}

impl NarrativeContext {
    /// Context for continuing `branch`: its last three sentences, every
    /// character, the first known location and the current emotional state.
    pub fn from_branch(branch: &Branch) -> Self {
        let sentences: Vec<&str> = branch
            .body
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let tail = sentences[sentences.len().saturating_sub(3)..].join(". ");

        Self {
            previous_events: if tail.is_empty() { Vec::new() } else { vec![tail] },
            active_characters: branch.world.characters.values().cloned().collect(),
            location: branch
                .world
                .locations
                .values()
                .next()
                .map(|l| l.name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            emotional_tone: branch.continuity.emotional_context.primary_emotion.clone(),
            tension: branch.continuity.narrative_tension,
            plot_stage: PlotStage::of_branch(branch),
        }
    }
}

/// Stylistic options for one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub genre: Option<String>,
    pub tone: Option<String>,
    pub length: LengthTier,
    /// Persona id; the registry default when unset.
    pub persona: Option<String>,
    pub themes: Vec<String>,
    /// Text the generation continues from.
    pub continuation: Option<String>,
    /// Story structure and zero-based stage to write toward.
    pub template: Option<(NarrativeTemplate, usize)>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_length(mut self, length: LengthTier) -> Self {
        self.length = length;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.themes.push(theme.into());
        self
    }

    pub fn with_continuation(mut self, text: impl Into<String>) -> Self {
        self.continuation = Some(text.into());
        self
    }

    pub fn with_template(mut self, template: NarrativeTemplate, stage: usize) -> Self {
        self.template = Some((template, stage));
        self
    }
}
