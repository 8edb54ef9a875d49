//! Branch metadata and the pure text measurements behind it.

use serde::{Deserialize, Serialize};

/// Reading speed used for reading-time estimates.
pub const DEFAULT_WORDS_PER_MINUTE: usize = 200;

/// Complexity tier of a body of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Literary,
}

impl Complexity {
    /// Classify text by mean word length and mean sentence length.
    ///
    /// Pure and deterministic. Empty text is `Simple`.
    pub fn of(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Complexity::Simple;
        }

        let sentences = text
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);

        let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg_word_length = total_chars as f64 / words.len() as f64;
        let avg_sentence_length = words.len() as f64 / sentences as f64;
        let score = avg_word_length * 0.5 + avg_sentence_length * 0.5;

        if score < 8.0 {
            Complexity::Simple
        } else if score < 12.0 {
            Complexity::Moderate
        } else if score < 16.0 {
            Complexity::Complex
        } else {
            Complexity::Literary
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Literary => "literary",
        }
    }
}

/// Audience content rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContentRating {
    /// Everyone.
    E,
    /// Teen.
    #[default]
    T,
    /// Mature.
    M,
    /// Restricted.
    R,
}

/// Word count, reading time and complexity of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    pub word_count: usize,
    pub reading_time_minutes: u32,
    pub complexity: Complexity,
}

impl TextStats {
    /// Measure a body of text. Never fails; empty text is zero words.
    pub fn measure(text: &str, words_per_minute: usize) -> Self {
        let word_count = text.split_whitespace().count();
        let wpm = words_per_minute.max(1);
        Self {
            word_count,
            reading_time_minutes: word_count.div_ceil(wpm) as u32,
            complexity: Complexity::of(text),
        }
    }
}

/// Declared metadata supplied by the caller on create or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataHints {
    pub genre: Option<String>,
    pub tone: Option<String>,
    /// Narrative voice (persona) id.
    pub voice: Option<String>,
    pub tags: Option<Vec<String>>,
    pub language: Option<String>,
    pub content_rating: Option<ContentRating>,
    pub mood: Option<Vec<String>>,
    pub themes: Option<Vec<String>>,
}

impl MetadataHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn rating(mut self, rating: ContentRating) -> Self {
        self.content_rating = Some(rating);
        self
    }

    pub fn mood<I, S>(mut self, mood: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mood = Some(mood.into_iter().map(Into::into).collect());
        self
    }

    pub fn themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = Some(themes.into_iter().map(Into::into).collect());
        self
    }
}

impl From<&BranchMetadata> for MetadataHints {
    fn from(metadata: &BranchMetadata) -> Self {
        Self {
            genre: Some(metadata.genre.clone()),
            tone: Some(metadata.tone.clone()),
            voice: Some(metadata.voice.clone()),
            tags: Some(metadata.tags.clone()),
            language: Some(metadata.language.clone()),
            content_rating: Some(metadata.content_rating),
            mood: Some(metadata.mood.clone()),
            themes: Some(metadata.themes.clone()),
        }
    }
}

/// Declared and derived metadata of a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMetadata {
    pub genre: String,
    pub tone: String,
    pub voice: String,
    pub tags: Vec<String>,
    pub language: String,
    pub content_rating: ContentRating,
    pub word_count: usize,
    pub reading_time_minutes: u32,
    pub complexity: Complexity,
    pub mood: Vec<String>,
    pub themes: Vec<String>,
}

impl BranchMetadata {
    /// Build metadata for `body`, filling undeclared fields with defaults.
    pub fn derive(body: &str, hints: &MetadataHints, words_per_minute: usize) -> Self {
        let stats = TextStats::measure(body, words_per_minute);
        Self {
            genre: hints.genre.clone().unwrap_or_else(|| "fantasy".to_string()),
            tone: hints.tone.clone().unwrap_or_else(|| "neutral".to_string()),
            voice: hints.voice.clone().unwrap_or_else(|| "default".to_string()),
            tags: hints.tags.clone().unwrap_or_default(),
            language: hints.language.clone().unwrap_or_else(|| "en".to_string()),
            content_rating: hints.content_rating.unwrap_or_default(),
            word_count: stats.word_count,
            reading_time_minutes: stats.reading_time_minutes,
            complexity: stats.complexity,
            mood: hints.mood.clone().unwrap_or_default(),
            themes: hints.themes.clone().unwrap_or_default(),
        }
    }

    /// Override declared fields that are set in `hints`.
    pub fn apply_hints(&mut self, hints: &MetadataHints) {
        if let Some(ref genre) = hints.genre {
            self.genre = genre.clone();
        }
        if let Some(ref tone) = hints.tone {
            self.tone = tone.clone();
        }
        if let Some(ref voice) = hints.voice {
            self.voice = voice.clone();
        }
        if let Some(ref tags) = hints.tags {
            self.tags = tags.clone();
        }
        if let Some(ref language) = hints.language {
            self.language = language.clone();
        }
        if let Some(rating) = hints.content_rating {
            self.content_rating = rating;
        }
        if let Some(ref mood) = hints.mood {
            self.mood = mood.clone();
        }
        if let Some(ref themes) = hints.themes {
            self.themes = themes.clone();
        }
    }
}
