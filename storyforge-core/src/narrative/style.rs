//! Persona styling applied to finished text, and multi-persona collaboration modes.

use super::persona::Persona;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HUMOR_THRESHOLD: f64 = 0.7;
const HUMOR_ASIDE: &str = " (though that's putting it mildly).";

/// How several personas work over one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// Each persona styles the previous persona's output in turn.
    Sequential,
    /// Each persona gives a generated opinion on the text.
    Debate,
    /// One pass with the personas' levels averaged.
    Blend,
}

impl CollaborationMode {
    pub fn name(&self) -> &'static str {
        match self {
            CollaborationMode::Sequential => "sequential",
            CollaborationMode::Debate => "debate",
            CollaborationMode::Blend => "blend",
        }
    }
}

impl fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollaborationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(CollaborationMode::Sequential),
            "debate" => Ok(CollaborationMode::Debate),
            "blend" => Ok(CollaborationMode::Blend),
            other => Err(format!("Unknown collaboration mode: {other}")),
        }
    }
}

/// Restyle `text` in `persona`'s voice.
///
/// In order: vocabulary substitution, sentence shaping by
/// `sentence_length`, a humorous aside for high-humor voices, then a
/// signature phrase inserted between sentences with the persona's
/// signature chance.
pub fn apply_style<R: Rng>(text: &str, persona: &Persona, rng: &mut R) -> String {
    let styled = adjust_vocabulary(text, &persona.unique_words);
    let styled = shape_sentences(&styled, &persona.sentence_length);
    let styled = add_quirks(&styled, persona.humor_level);
    insert_signature(&styled, persona, rng)
}

/// Replace the word "very" with the voice's first preferred word.
pub fn adjust_vocabulary(text: &str, words: &[String]) -> String {
    let Some(word) = words.iter().find(|w| !w.trim().is_empty()) else {
        return text.to_string();
    };
    match Regex::new(r"\bvery\b") {
        Ok(re) => re.replace_all(text, regex::NoExpand(word)).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Split on ", and" for short sentences; join sentences with ", and" for
/// long ones. Other lengths leave the text alone.
pub fn shape_sentences(text: &str, sentence_length: &str) -> String {
    let (pattern, replacement) = match sentence_length {
        "short" => (r",\s*and\s+", ". "),
        "long" => (r"\.\s+([A-Z])", ", and $1"),
        _ => return text.to_string(),
    };
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(text, replacement).into_owned(),
        Err(_) => text.to_string(),
    }
}

fn add_quirks(text: &str, humor_level: f64) -> String {
    if humor_level <= HUMOR_THRESHOLD {
        return text.to_string();
    }
    match text.strip_suffix('.') {
        Some(body) => format!("{body}{HUMOR_ASIDE}"),
        None => text.to_string(),
    }
}

fn insert_signature<R: Rng>(text: &str, persona: &Persona, rng: &mut R) -> String {
    if persona.signature_phrases.is_empty() || !rng.gen_bool(persona.effective_signature_chance())
    {
        return text.to_string();
    }
    let Some(phrase) = persona.signature_phrases.choose(rng) else {
        return text.to_string();
    };

    let mut sentences: Vec<&str> = text.split(". ").collect();
    let at = rng.gen_range(0..sentences.len());
    sentences.insert(at, phrase.as_str());
    sentences.join(". ")
}
