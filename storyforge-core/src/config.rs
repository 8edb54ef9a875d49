//! Runtime configuration for the branch manager and generation.

use crate::branch::DEFAULT_WORDS_PER_MINUTE;
use crate::versions::DEFAULT_SNAPSHOT_LIMIT;
use std::time::Duration;
use thiserror::Error;

/// Errors from reading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Configuration for a [`BranchManager`](crate::BranchManager).
#[derive(Debug, Clone, PartialEq)]
pub struct StoryForgeConfig {
    /// Snapshots retained per branch.
    pub snapshot_limit: usize,

    /// Reading speed used for reading-time estimates.
    pub words_per_minute: usize,

    /// Upper bound on a single generation call.
    pub generation_timeout: Duration,

    /// Total attempts per generation, retries included.
    pub max_generation_attempts: u32,

    /// Model override for the Claude backend.
    pub model: Option<String>,

    /// Maximum tokens per generation.
    pub max_tokens: usize,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Rolling memory: excerpts kept.
    pub memory_excerpt_limit: usize,

    /// Rolling memory: extracted facts kept.
    pub memory_fact_limit: usize,
}

impl Default for StoryForgeConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            generation_timeout: Duration::from_secs(120),
            max_generation_attempts: 3,
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            memory_excerpt_limit: 100,
            memory_fact_limit: 200,
        }
    }
}

impl StoryForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot_limit(mut self, limit: usize) -> Self {
        self.snapshot_limit = limit.max(1);
        self
    }

    pub fn with_words_per_minute(mut self, wpm: usize) -> Self {
        self.words_per_minute = wpm.max(1);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_max_generation_attempts(mut self, attempts: u32) -> Self {
        self.max_generation_attempts = attempts.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_memory_limits(mut self, excerpts: usize, facts: usize) -> Self {
        self.memory_excerpt_limit = excerpts;
        self.memory_fact_limit = facts;
        self
    }

    /// Defaults overridden by `STORYFORGE_*` environment variables.
    ///
    /// Recognised: `STORYFORGE_SNAPSHOT_LIMIT`, `STORYFORGE_WORDS_PER_MINUTE`,
    /// `STORYFORGE_GENERATION_TIMEOUT_SECS`, `STORYFORGE_MAX_GENERATION_ATTEMPTS`,
    /// `STORYFORGE_MODEL`, `STORYFORGE_MAX_TOKENS`, `STORYFORGE_TEMPERATURE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`StoryForgeConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse(&lookup, "STORYFORGE_SNAPSHOT_LIMIT")? {
            config = config.with_snapshot_limit(v);
        }
        if let Some(v) = parse(&lookup, "STORYFORGE_WORDS_PER_MINUTE")? {
            config = config.with_words_per_minute(v);
        }
        if let Some(v) = parse::<u64, _>(&lookup, "STORYFORGE_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "STORYFORGE_MAX_GENERATION_ATTEMPTS")? {
            config = config.with_max_generation_attempts(v);
        }
        if let Some(model) = lookup("STORYFORGE_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = Some(model);
        }
        if let Some(v) = parse(&lookup, "STORYFORGE_MAX_TOKENS")? {
            config.max_tokens = v;
        }
        if let Some(v) = parse(&lookup, "STORYFORGE_TEMPERATURE")? {
            config.temperature = Some(v);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
