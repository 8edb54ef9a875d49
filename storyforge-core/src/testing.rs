//! Testing utilities for the narrative store.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGenerator` for deterministic generation without API calls
//! - `UnavailableRepository` for exercising storage degradation
//! - `StoryHarness` for scripted branching scenarios
//! - Assertion helpers for verifying branch state

use crate::branch::{AuthorId, Branch, BranchId, CharacterStatus};
use crate::config::StoryForgeConfig;
use crate::error::{StoryError, StoryResult};
use crate::manager::{BranchManager, NewBranch};
use crate::narrative::{
    GenerationError, GenerationRequest, NarrativeGenerator, NarrativeOrchestrator, PersonaRegistry,
};
use crate::persist::{BranchRepository, InMemoryRepository, PersistError};
use crate::store::BranchStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Text returned once the script runs out.
pub const FALLBACK_TEXT: &str = "The story continues.";

enum ScriptedReply {
    Text(String),
    Fail(GenerationError),
    Delayed(Duration, String),
    Gated(Arc<Notify>, String),
}

/// A generator that returns scripted replies in order.
///
/// Every request is recorded so tests can inspect the prompts.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: GenerationError) -> Self {
        self.push(ScriptedReply::Fail(error));
        self
    }

    /// Queue a reply that arrives after `delay`.
    pub fn delayed(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Delayed(delay, text.into()));
        self
    }

    /// Queue a reply that arrives once `gate` is notified.
    pub fn gated(self, gate: Arc<Notify>, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Gated(gate, text.into()));
        self
    }

    /// Queue a successful reply on a shared generator.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.push(ScriptedReply::Text(text.into()));
    }

    /// Queue a failure on a shared generator.
    pub fn push_failure(&self, error: GenerationError) {
        self.push(ScriptedReply::Fail(error));
    }

    /// Queue a gated reply on a shared generator.
    pub fn push_gated(&self, gate: Arc<Notify>, text: impl Into<String>) {
        self.push(ScriptedReply::Gated(gate, text.into()));
    }

    fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of generate calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(error)) => Err(error),
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(ScriptedReply::Gated(gate, text)) => {
                gate.notified().await;
                Ok(text)
            }
            None => Ok(FALLBACK_TEXT.to_string()),
        }
    }
}

/// A repository that fails every call until it recovers.
///
/// Once recovered it behaves like an [`InMemoryRepository`].
#[derive(Debug, Default)]
pub struct UnavailableRepository {
    recovered: AtomicBool,
    inner: InMemoryRepository,
}

impl UnavailableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start serving calls.
    pub fn recover(&self) {
        self.recovered.store(true, Ordering::SeqCst);
    }

    /// Fail calls again.
    pub fn fail(&self) {
        self.recovered.store(false, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.recovered.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistError::Unavailable("repository offline".to_string()))
        }
    }
}

#[async_trait]
impl BranchRepository for UnavailableRepository {
    async fn save(&self, branch: &Branch) -> Result<(), PersistError> {
        self.check()?;
        self.inner.save(branch).await
    }

    async fn load(&self, id: &BranchId) -> Result<Option<Branch>, PersistError> {
        self.check()?;
        self.inner.load(id).await
    }

    async fn list_by_author(&self, author: &AuthorId) -> Result<Vec<Branch>, PersistError> {
        self.check()?;
        self.inner.list_by_author(author).await
    }

    async fn delete(&self, id: &BranchId) -> Result<(), PersistError> {
        self.check()?;
        self.inner.delete(id).await
    }
}

/// The default personas with signature phrases turned off, so generated text
/// is exactly what the generator returned after name normalization.
pub fn quiet_personas() -> PersonaRegistry {
    let mut registry = PersonaRegistry::with_defaults();
    let ids: Vec<String> = registry.ids().into_iter().map(String::from).collect();
    for id in ids {
        if let Some(persona) = registry.get(&id).cloned() {
            registry.register(persona.with_signature_chance(0.0));
        }
    }
    registry
}

/// Test harness for branching scenarios.
pub struct StoryHarness {
    pub manager: Arc<BranchManager>,
    pub generator: Arc<ScriptedGenerator>,
}

impl StoryHarness {
    /// A manager over an empty store with a scripted generator.
    pub fn new() -> Self {
        Self::with_config(StoryForgeConfig::default())
    }

    pub fn with_config(config: StoryForgeConfig) -> Self {
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = NarrativeOrchestrator::new(generator.clone(), &config)
            .with_personas(quiet_personas())
            .with_seed(0);
        let manager = BranchManager::new(BranchStore::new(), config).with_orchestrator(orchestrator);

        Self {
            manager: Arc::new(manager),
            generator,
        }
    }

    /// Like [`StoryHarness::new`], writing through to `repository`.
    pub fn with_repository(repository: Arc<dyn BranchRepository>) -> Self {
        let config = StoryForgeConfig::default();
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = NarrativeOrchestrator::new(generator.clone(), &config)
            .with_personas(quiet_personas())
            .with_seed(0);
        let manager = BranchManager::new(BranchStore::new(), config)
            .with_orchestrator(orchestrator)
            .with_repository(repository);

        Self {
            manager: Arc::new(manager),
            generator,
        }
    }

    /// Queue generated text.
    pub fn expect_text(&self, text: impl Into<String>) -> &Self {
        self.generator.push_reply(text);
        self
    }

    /// Create a root branch.
    pub async fn root(&self, author: &str, title: &str, body: &str) -> StoryResult<Branch> {
        self.manager
            .create_branch(NewBranch::new(author, title, body))
            .await
    }

    /// Create a child branch.
    pub async fn child(&self, parent: &BranchId, author: &str, body: &str) -> StoryResult<Branch> {
        self.manager
            .create_branch(NewBranch::new(author, "Child", body).with_parent(*parent))
            .await
    }

    /// Current stored state of a branch.
    pub async fn branch(&self, id: &BranchId) -> StoryResult<Branch> {
        self.manager.get_branch(id).await
    }
}

impl Default for StoryHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that `parent` lists `child` among its children.
#[track_caller]
pub fn assert_child_of(parent: &Branch, child: &Branch) {
    assert!(
        parent.children.contains(&child.id),
        "Expected {} to list child {}",
        parent.id,
        child.id
    );
    assert_eq!(
        child.parent_id,
        Some(parent.id),
        "Expected {} to point at parent {}",
        child.id,
        parent.id
    );
}

/// Assert a character's status in a branch.
#[track_caller]
pub fn assert_character_status(branch: &Branch, character_id: &str, status: CharacterStatus) {
    let actual = branch.world.characters.get(character_id).map(|c| c.status);
    assert_eq!(
        actual,
        Some(status),
        "Expected character '{character_id}' to be {}, got {actual:?}",
        status.name()
    );
}

/// Assert a consistency score strictly below `bound`.
#[track_caller]
pub fn assert_score_below(branch: &Branch, bound: u8) {
    assert!(
        branch.consistency_score() < bound,
        "Expected consistency score below {bound}, got {}",
        branch.consistency_score()
    );
}

/// Assert that a result is a not-found error.
#[track_caller]
pub fn assert_not_found<T: std::fmt::Debug>(result: &StoryResult<T>) {
    assert!(
        matches!(result, Err(e) if e.is_not_found()),
        "Expected NotFound, got {result:?}"
    );
}

/// Assert that a result is an authorization failure.
#[track_caller]
pub fn assert_unauthorized<T: std::fmt::Debug>(result: &StoryResult<T>) {
    assert!(
        matches!(result, Err(StoryError::Unauthorized { .. })),
        "Expected Unauthorized, got {result:?}"
    );
}
