//! Narrative voice profiles.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Id of the persona used when none is requested.
pub const DEFAULT_PERSONA: &str = "narrator";

/// Chance a signature phrase is prepended to generated text.
pub const DEFAULT_SIGNATURE_CHANCE: f64 = 0.3;

/// A narrative voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Adjectives describing the voice, used in the system prompt.
    pub tone: Vec<String>,
    /// short, medium, long or varied.
    pub sentence_length: String,
    /// slow, moderate, fast or dynamic.
    pub pacing: String,
    /// Replaced with `[redacted]` wherever they appear, ignoring case.
    pub forbidden_topics: Vec<String>,
    pub signature_phrases: Vec<String>,
    /// 0.0-1.0.
    pub signature_chance: f64,
    /// Preferred words; the first one stands in for "very".
    #[serde(default)]
    pub unique_words: Vec<String>,
    /// 0.0-1.0. Above 0.7 the voice adds a wry aside to the closing sentence.
    #[serde(default)]
    pub humor_level: f64,
    #[serde(default)]
    pub formality: f64,
    #[serde(default)]
    pub verbosity: f64,
}

impl Persona {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tone: Vec::new(),
            sentence_length: "varied".to_string(),
            pacing: "moderate".to_string(),
            forbidden_topics: Vec::new(),
            signature_phrases: Vec::new(),
            signature_chance: DEFAULT_SIGNATURE_CHANCE,
            unique_words: Vec::new(),
            humor_level: 0.3,
            formality: 0.5,
            verbosity: 0.5,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tone(mut self, tone: &[&str]) -> Self {
        self.tone = tone.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_style(mut self, sentence_length: &str, pacing: &str) -> Self {
        self.sentence_length = sentence_length.to_string();
        self.pacing = pacing.to_string();
        self
    }

    pub fn with_signatures(mut self, phrases: &[&str]) -> Self {
        self.signature_phrases = phrases.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_forbidden_topic(mut self, topic: impl Into<String>) -> Self {
        self.forbidden_topics.push(topic.into());
        self
    }

    pub fn with_signature_chance(mut self, chance: f64) -> Self {
        self.signature_chance = chance;
        self
    }

    pub fn with_vocabulary(mut self, words: &[&str]) -> Self {
        self.unique_words = words.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn with_levels(mut self, humor: f64, formality: f64, verbosity: f64) -> Self {
        self.humor_level = humor;
        self.formality = formality;
        self.verbosity = verbosity;
        self
    }

    /// `signature_chance` clamped to 0.0-1.0, with NaN treated as never.
    pub fn effective_signature_chance(&self) -> f64 {
        if self.signature_chance.is_nan() {
            0.0
        } else {
            self.signature_chance.clamp(0.0, 1.0)
        }
    }

    /// The first persona with humor, formality and verbosity averaged over
    /// all of them. `None` for an empty slice.
    pub fn blend(personas: &[Persona]) -> Option<Persona> {
        let (first, _) = personas.split_first()?;
        let count = personas.len() as f64;
        let average = |level: fn(&Persona) -> f64| personas.iter().map(level).sum::<f64>() / count;

        let mut blended = first.clone();
        blended.humor_level = average(|p| p.humor_level);
        blended.formality = average(|p| p.formality);
        blended.verbosity = average(|p| p.verbosity);
        Some(blended)
    }

    /// System prompt describing this voice.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}", self.name);
        if !self.description.is_empty() {
            prompt.push_str(", ");
            prompt.push_str(&self.description);
        }
        prompt.push_str(".\n");
        if !self.tone.is_empty() {
            prompt.push_str(&format!("- Tone: {}\n", self.tone.join(", ")));
        }
        prompt.push_str(&format!(
            "- Style: {} sentences, {} pacing\n",
            self.sentence_length, self.pacing
        ));
        prompt.push_str("Write only story prose. Do not add commentary or headings.");
        prompt
    }
}

/// Known personas, keyed by id.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: HashMap<String, Persona>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PersonaRegistry {
    /// An empty registry. [`PersonaRegistry::resolve`] falls back to a plain
    /// narrator when nothing is registered.
    pub fn empty() -> Self {
        Self {
            personas: HashMap::new(),
        }
    }

    /// The built-in voices.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(narrator());
        registry.register(
            Persona::new("poet", "The Poet")
                .with_description("a lyrical voice that sees the world in images")
                .with_tone(&["lyrical", "melancholic", "evocative"])
                .with_style("long", "slow")
                .with_signatures(&["Like shadows dancing", "In the quiet spaces between"])
                .with_vocabulary(&["ethereal", "luminous", "whisper"])
                .with_levels(0.2, 0.7, 0.8),
        );
        registry.register(
            Persona::new("critic", "The Critic")
                .with_description("a sharp observer who weighs every choice")
                .with_tone(&["analytical", "dry", "incisive"])
                .with_style("medium", "moderate")
                .with_signatures(&["One cannot help but notice", "While competent"])
                .with_vocabulary(&["notably", "arguably", "decidedly"])
                .with_levels(0.8, 0.8, 0.6),
        );
        registry.register(
            Persona::new("dialogue_master", "The Dialogue Master")
                .with_description("a writer of natural, character-revealing speech")
                .with_tone(&["conversational", "vivid"])
                .with_style("short", "fast")
                .with_signature_chance(0.0),
        );
        registry.register(
            Persona::new("plot_weaver", "The Plot Weaver")
                .with_description("a planner who raises stakes without losing threads")
                .with_tone(&["urgent", "taut"])
                .with_style("varied", "fast")
                .with_signature_chance(0.0),
        );
        registry.register(
            Persona::new("resolution_master", "The Resolution Master")
                .with_description("a closer who ties threads into an earned ending")
                .with_tone(&["measured", "resonant"])
                .with_style("medium", "slow")
                .with_signature_chance(0.0),
        );
        registry.register(
            Persona::new("genre_shifter", "The Genre Shifter")
                .with_description("a stylist who retells events in a new genre and tone")
                .with_tone(&["adaptable"])
                .with_signature_chance(0.0),
        );
        registry
    }

    /// Add or replace a persona.
    pub fn register(&mut self, persona: Persona) {
        self.personas.insert(persona.id.clone(), persona);
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.get(id)
    }

    /// Persona for `id`, falling back to the default narrator for unknown
    /// ids, `None` and `"default"`.
    pub fn resolve(&self, id: Option<&str>) -> Persona {
        id.filter(|id| *id != "default")
            .and_then(|id| self.personas.get(id))
            .or_else(|| self.personas.get(DEFAULT_PERSONA))
            .cloned()
            .unwrap_or_else(narrator)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn narrator() -> Persona {
    Persona::new(DEFAULT_PERSONA, "The Narrator")
        .with_description("a classic storyteller with a clear, engaging voice")
        .with_tone(&["warm", "engaging", "clear"])
        .with_style("varied", "moderate")
        .with_signatures(&["And so it was that", "Little did they know"])
        .with_vocabulary(&["perhaps", "indeed", "nevertheless"])
        .with_levels(0.3, 0.6, 0.7)
}
