//! Narrative generation orchestrator.
//!
//! Builds prompts from story state, calls the injected [`NarrativeGenerator`]
//! with a timeout and a bounded number of attempts, then post-processes the
//! text:
//!
//! 1. character name variants and aliases become the canonical name,
//! 2. the persona's forbidden topics become `[redacted]`,
//! 3. a persona signature phrase is sometimes prepended.
//!
//! Finished text can also be restyled in one or more persona voices with
//! [`NarrativeOrchestrator::collaborate`].

mod context;
mod generator;
mod memory;
mod persona;
mod style;
mod template;

pub use context::{
    alternative_tone, ContinuationMode, Ending, GenerationOptions, LengthTier, NarrativeContext,
    PlotStage,
};
pub use generator::{ClaudeGenerator, GenerationError, GenerationRequest, NarrativeGenerator};
pub use memory::RollingMemory;
pub use persona::{Persona, PersonaRegistry, DEFAULT_PERSONA, DEFAULT_SIGNATURE_CHANCE};
pub use style::{adjust_vocabulary, apply_style, shape_sentences, CollaborationMode};
pub use template::NarrativeTemplate;

use crate::branch::{Branch, Character, EmotionalContext, PlotThread};
use crate::config::StoryForgeConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::{Regex, RegexBuilder};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Characters of the previous text quoted in a continuation prompt.
const CONTINUATION_TAIL_CHARS: usize = 200;

/// Characters of the text each persona comments on in a debate.
const DEBATE_EXCERPT_CHARS: usize = 100;

/// Builds requests, calls the generator and cleans up what comes back.
pub struct NarrativeOrchestrator {
    generator: Arc<dyn NarrativeGenerator>,
    personas: PersonaRegistry,
    memory: Mutex<RollingMemory>,
    rng: StdMutex<StdRng>,
    timeout: Duration,
    max_attempts: u32,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl NarrativeOrchestrator {
    pub fn new(generator: Arc<dyn NarrativeGenerator>, config: &StoryForgeConfig) -> Self {
        Self {
            generator,
            personas: PersonaRegistry::with_defaults(),
            memory: Mutex::new(RollingMemory::new(
                config.memory_excerpt_limit,
                config.memory_fact_limit,
            )),
            rng: StdMutex::new(StdRng::from_entropy()),
            timeout: config.generation_timeout,
            max_attempts: config.max_generation_attempts.max(1),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Use a seeded RNG so signature insertion is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdMutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_personas(mut self, personas: PersonaRegistry) -> Self {
        self.personas = personas;
        self
    }

    pub fn personas(&self) -> &PersonaRegistry {
        &self.personas
    }

    /// Copy of the rolling memory.
    pub async fn memory(&self) -> RollingMemory {
        self.memory.lock().await.clone()
    }

    /// Generate the next part of a story.
    pub async fn generate(
        &self,
        context: &NarrativeContext,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let persona = self.personas.resolve(options.persona.as_deref());
        let memory_section = self.memory.lock().await.prompt_section();
        let prompt = build_story_prompt(context, options, memory_section.as_deref());

        let raw = self
            .invoke(self.request(&persona, prompt, options.length))
            .await?;
        let text = self.finish(&raw, &context.active_characters, &persona);

        self.memory.lock().await.record(&text);
        Ok(text)
    }

    /// Generate a continuation of `branch`.
    ///
    /// Genre, tone and persona default to the branch metadata.
    pub async fn continue_from(
        &self,
        branch: &Branch,
        mode: ContinuationMode,
        mut options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut context = NarrativeContext::from_branch(branch);
        options
            .genre
            .get_or_insert_with(|| branch.metadata.genre.clone());
        options
            .persona
            .get_or_insert_with(|| branch.metadata.voice.clone());

        match mode {
            ContinuationMode::Continue => {
                options.continuation = Some(tail_chars(&branch.body, CONTINUATION_TAIL_CHARS));
            }
            ContinuationMode::Branch => {
                context.plot_stage = PlotStage::next_from_threads(&branch.continuity.plot_threads);
            }
            ContinuationMode::Alternate => {
                options.tone = Some(alternative_tone(&branch.metadata.tone).to_string());
            }
        }
        options
            .tone
            .get_or_insert_with(|| branch.metadata.tone.clone());

        debug!(branch = %branch.id, ?mode, stage = %context.plot_stage, "Continuing branch");
        self.generate(&context, &options).await
    }

    /// Dialogue between `characters` in `situation`.
    pub async fn generate_dialogue(
        &self,
        characters: &[Character],
        situation: &str,
        emotion: &EmotionalContext,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let persona = self
            .personas
            .resolve(Some(options.persona.as_deref().unwrap_or("dialogue_master")));

        let mut prompt = String::from("Write dialogue for the following situation.\n");
        prompt.push_str(&format!("\nSituation: {situation}\n"));
        prompt.push_str(&format!("Emotional context: {}\n", emotion.primary_emotion));
        prompt.push_str("\nCharacters:\n");
        for character in characters {
            prompt.push_str(&format!("- {}", character.name));
            if !character.traits.is_empty() {
                prompt.push_str(&format!(": {}", character.traits.join(", ")));
            }
            prompt.push('\n');
        }
        prompt.push_str(
            "\nFormat each line as `Name: speech`. Reveal character and advance the plot.",
        );

        let raw = self
            .invoke(self.request(&persona, prompt, options.length))
            .await?;
        Ok(self.finish(&raw, characters, &persona))
    }

    /// Retell `content` in another genre and tone.
    pub async fn reinterpret(
        &self,
        content: &str,
        from: (&str, &str),
        to: (&str, &str),
    ) -> Result<String, GenerationError> {
        let persona = self.personas.resolve(Some("genre_shifter"));
        let prompt = format!(
            "Transform the following {} story with a {} tone into a {} story with a {} tone. \
             Keep the core plot; change style, description and atmosphere.\n\n{content}",
            from.0, from.1, to.0, to.1
        );
        let words = content.split_whitespace().count().max(1);
        let raw = self
            .invoke(self.request_for_words(&persona, prompt, words))
            .await?;
        Ok(self.finish(&raw, &[], &persona))
    }

    /// A scene that raises tension from `tension` toward `target`.
    ///
    /// When no escalation is needed the threads are resolved instead.
    pub async fn escalate_plot(
        &self,
        threads: &[PlotThread],
        tension: f32,
        target: f32,
    ) -> Result<String, GenerationError> {
        let needed = target - tension;
        if needed <= 0.0 {
            return self.generate_resolution(threads, Ending::default()).await;
        }

        let persona = self.personas.resolve(Some("plot_weaver"));
        let mut prompt = format!("Escalate the following plot threads by {needed:.1} tension points:\n");
        for thread in threads.iter().filter(|t| t.status.is_open()) {
            prompt.push_str(&format!("- {}: {}\n", thread.name, thread.description));
        }
        prompt.push_str("\nWrite a scene that raises the stakes.");

        let raw = self
            .invoke(self.request(&persona, prompt, LengthTier::Short))
            .await?;
        Ok(self.finish(&raw, &[], &persona))
    }

    /// An ending that resolves the open threads.
    pub async fn generate_resolution(
        &self,
        threads: &[PlotThread],
        ending: Ending,
    ) -> Result<String, GenerationError> {
        let persona = self.personas.resolve(Some("resolution_master"));
        let mut prompt = format!(
            "Resolve the following plot threads with a {} ending:\n",
            ending.name()
        );
        for thread in threads.iter().filter(|t| t.status.is_open()) {
            prompt.push_str(&format!("- {}: {}\n", thread.name, thread.description));
        }
        prompt.push_str("\nWrite a satisfying resolution.");

        let raw = self
            .invoke(self.request(&persona, prompt, LengthTier::Medium))
            .await?;
        Ok(self.finish(&raw, &[], &persona))
    }

    /// Restyle `content` in `persona`'s voice.
    pub fn stylize(&self, content: &str, persona: &Persona) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        apply_style(content, persona, &mut *rng)
    }

    /// Work `content` over with several personas.
    ///
    /// `Sequential` restyles in each voice in turn, `Blend` restyles once
    /// with averaged levels, and `Debate` asks the generator for each
    /// persona's opinion and returns them as `Name: "opinion"` paragraphs.
    /// No personas leaves `content` unchanged.
    pub async fn collaborate(
        &self,
        content: &str,
        personas: &[Persona],
        mode: CollaborationMode,
    ) -> Result<String, GenerationError> {
        if personas.is_empty() {
            return Ok(content.to_string());
        }
        debug!(%mode, personas = personas.len(), "Collaborating");

        match mode {
            CollaborationMode::Sequential => Ok(personas
                .iter()
                .fold(content.to_string(), |text, persona| self.stylize(&text, persona))),
            CollaborationMode::Blend => Ok(match Persona::blend(personas) {
                Some(blended) => self.stylize(content, &blended),
                None => content.to_string(),
            }),
            CollaborationMode::Debate => {
                let excerpt: String = content.chars().take(DEBATE_EXCERPT_CHARS).collect();
                let mut opinions = Vec::with_capacity(personas.len());
                for persona in personas {
                    let prompt = format!("As {}, give your opinion on: {excerpt}...", persona.name);
                    let raw = self
                        .invoke(self.request(persona, prompt, LengthTier::Micro))
                        .await?;
                    let opinion = redact(raw.trim(), &persona.forbidden_topics);
                    opinions.push(format!("{}: \"{opinion}\"", persona.name));
                }
                Ok(opinions.join("\n\n"))
            }
        }
    }

    fn request(&self, persona: &Persona, prompt: String, length: LengthTier) -> GenerationRequest {
        self.request_for_words(persona, prompt, length.target_words())
    }

    fn request_for_words(
        &self,
        persona: &Persona,
        prompt: String,
        target_words: usize,
    ) -> GenerationRequest {
        GenerationRequest {
            system: persona.system_prompt(),
            prompt,
            persona_id: persona.id.clone(),
            target_words,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Call the generator with a per-attempt timeout.
    ///
    /// Only retryable failures are retried, and never more than
    /// `max_attempts` calls are made in total.
    async fn invoke(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, self.generator.generate(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(self.timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, persona = %request.persona_id, "Retrying generation");
                }
                Err(err) if attempt > 1 => {
                    return Err(GenerationError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn finish(&self, raw: &str, characters: &[Character], persona: &Persona) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        post_process(raw, characters, persona, &mut *rng)
    }
}

/// Apply name normalization, redaction and signature insertion.
pub fn post_process<R: Rng>(
    text: &str,
    characters: &[Character],
    persona: &Persona,
    rng: &mut R,
) -> String {
    let normalized = normalize_names(text, characters);
    let redacted = redact(&normalized, &persona.forbidden_topics);

    let chance = persona.effective_signature_chance();
    if !persona.signature_phrases.is_empty() && rng.gen_bool(chance) {
        if let Some(phrase) = persona.signature_phrases.choose(rng) {
            return format!("{phrase} {redacted}");
        }
    }
    redacted
}

/// Replace alias and case variants of each character's name with the
/// canonical name. Only whole words are replaced.
pub fn normalize_names(text: &str, characters: &[Character]) -> String {
    let mut out = text.to_string();
    for character in characters {
        let canonical = character.name.as_str();
        let mut variants: Vec<String> = vec![canonical.to_lowercase(), canonical.to_uppercase()];
        variants.extend(character.aliases.iter().cloned());
        variants.retain(|v| !v.trim().is_empty() && v != canonical);
        variants.sort_by_key(|v| std::cmp::Reverse(v.len()));
        variants.dedup();

        for variant in variants {
            let pattern = format!(r"\b{}\b", regex::escape(&variant));
            if let Ok(re) = Regex::new(&pattern) {
                out = re.replace_all(&out, regex::NoExpand(canonical)).into_owned();
            }
        }
    }
    out
}

/// Replace every case-insensitive occurrence of each topic with `[redacted]`.
pub fn redact(text: &str, topics: &[String]) -> String {
    let mut out = text.to_string();
    for topic in topics.iter().filter(|t| !t.trim().is_empty()) {
        let built = RegexBuilder::new(&regex::escape(topic))
            .case_insensitive(true)
            .build();
        if let Ok(re) = built {
            out = re.replace_all(&out, "[redacted]").into_owned();
        }
    }
    out
}

fn build_story_prompt(
    context: &NarrativeContext,
    options: &GenerationOptions,
    memory: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !context.previous_events.is_empty() {
        parts.push(format!(
            "Previous events: {}",
            context.previous_events.join("; ")
        ));
    }
    if !context.active_characters.is_empty() {
        let names: Vec<&str> = context
            .active_characters
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        parts.push(format!("Active characters: {}", names.join(", ")));
    }
    parts.push(format!("Current location: {}", context.location));
    parts.push(format!("Emotional tone: {}", context.emotional_tone));
    parts.push(format!("Tension level: {:.1}/10", context.tension));
    parts.push(format!("Plot stage: {}", context.plot_stage));
    if let Some((template, stage)) = options.template {
        if let Some(goal) = template.stage_prompt(stage) {
            parts.push(format!("Structure: {template}"));
            parts.push(format!("Stage goal: {goal}"));
        }
    }

    if let Some(memory) = memory {
        parts.push(String::new());
        parts.push(memory.to_string());
    }

    parts.push(String::new());
    if let Some(ref genre) = options.genre {
        parts.push(format!("Genre: {genre}"));
    }
    if let Some(ref tone) = options.tone {
        parts.push(format!("Tone: {tone}"));
    }
    if !options.themes.is_empty() {
        parts.push(format!("Themes to explore: {}", options.themes.join(", ")));
    }
    parts.push(format!("Length: about {} words", options.length.target_words()));

    if let Some(ref from) = options.continuation {
        parts.push(format!("\nContinue from: \"...{from}\""));
    }

    parts.push("\nWrite the next part of the story.".to_string());
    parts.join("\n")
}

/// Last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}
