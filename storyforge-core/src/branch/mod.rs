//! Branch records and the data they carry.
//!
//! A [`Branch`] is one node in a forest of narrative trees. Everything a
//! branch owns is plain owned data, so `Clone` is always a deep copy: forking a
//! child never shares state with its parent.

mod continuity;
mod metadata;
mod world;

pub use continuity::{
    Callback, ContinuityState, Contradiction, EmotionalContext, Fact, Foreshadowing, PlotThread,
    Severity, ThreadStatus,
};
pub use metadata::{
    BranchMetadata, Complexity, ContentRating, MetadataHints, TextStats, DEFAULT_WORDS_PER_MINUTE,
};
pub use world::{
    Character, CharacterStatus, Decision, EntityMap, FlagValue, Importance, Item, Location,
    Physics, RelationshipKind, TimelineEvent, WorldDescriptor, WorldRule, WorldState,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(Uuid);

impl BranchId {
    /// Create a new unique branch ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch_{}", self.0)
    }
}

/// Identifier of an author or collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AuthorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Engagement statistics for a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchStats {
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub branches_created: u64,
    pub average_rating: f32,
    pub completion_rate: f32,
    /// Mirrors `metadata.reading_time_minutes`.
    pub reading_time: u32,
    pub engagement_score: f32,
}

/// A node in the narrative forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    /// `None` for a root branch.
    pub parent_id: Option<BranchId>,
    pub author_id: AuthorId,
    pub title: String,
    pub body: String,
    /// Starts at 1 and increases on every content-affecting mutation.
    pub version: u32,
    pub metadata: BranchMetadata,
    pub world: WorldState,
    pub continuity: ContinuityState,
    /// Child branch ids in creation order. Owned by the store.
    pub children: Vec<BranchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_published: bool,
    /// Actors allowed to edit. The author is always the first entry.
    pub collaborators: Vec<AuthorId>,
    pub stats: BranchStats,
}

impl Branch {
    /// Build a fresh version-1 branch with the given state.
    ///
    /// Metadata is derived from `body` and `hints`; the continuity score is
    /// whatever `continuity` carries until a validation overwrites it.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        author_id: AuthorId,
        title: impl Into<String>,
        body: impl Into<String>,
        hints: &MetadataHints,
        parent_id: Option<BranchId>,
        world: WorldState,
        continuity: ContinuityState,
        words_per_minute: usize,
    ) -> Self {
        let body = body.into();
        let metadata = BranchMetadata::derive(&body, hints, words_per_minute);
        let now = Utc::now();
        Self {
            id: BranchId::new(),
            parent_id,
            collaborators: vec![author_id.clone()],
            author_id,
            title: title.into(),
            stats: BranchStats {
                reading_time: metadata.reading_time_minutes,
                ..BranchStats::default()
            },
            body,
            version: 1,
            metadata,
            world,
            continuity,
            children: Vec::new(),
            created_at: now,
            updated_at: now,
            published_at: None,
            is_published: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether the branch has been logically deleted.
    pub fn is_deleted(&self) -> bool {
        self.metadata.tags.iter().any(|t| t == DELETED_TAG)
    }

    pub fn is_collaborator(&self, actor: &AuthorId) -> bool {
        self.collaborators.contains(actor)
    }

    pub fn consistency_score(&self) -> u8 {
        self.continuity.consistency_score
    }

    /// Recompute body-derived metadata after the body changed.
    pub(crate) fn refresh_text_metadata(&mut self, words_per_minute: usize) {
        let stats = TextStats::measure(&self.body, words_per_minute);
        self.metadata.word_count = stats.word_count;
        self.metadata.reading_time_minutes = stats.reading_time_minutes;
        self.metadata.complexity = stats.complexity;
        self.stats.reading_time = stats.reading_time_minutes;
    }
}

/// Tag marking a logically deleted branch.
pub const DELETED_TAG: &str = "deleted";

/// A partial update applied by `BranchManager::update_branch`.
///
/// Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct BranchUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub hints: Option<MetadataHints>,
    pub world: Option<WorldState>,
    pub continuity: Option<ContinuityState>,
    pub narrative_tension: Option<f32>,
}

impl BranchUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_hints(mut self, hints: MetadataHints) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn with_world(mut self, world: WorldState) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_continuity(mut self, continuity: ContinuityState) -> Self {
        self.continuity = Some(continuity);
        self
    }

    pub fn with_tension(mut self, tension: f32) -> Self {
        self.narrative_tension = Some(tension);
        self
    }

    /// Whether nothing would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.hints.is_none()
            && self.world.is_none()
            && self.continuity.is_none()
            && self.narrative_tension.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(body: &str) -> Branch {
        Branch::assemble(
            AuthorId::new("ada"),
            "Opening",
            body,
            &MetadataHints::default(),
            None,
            WorldState::default(),
            ContinuityState::default(),
            DEFAULT_WORDS_PER_MINUTE,
        )
    }

    #[test]
    fn test_branch_id_display() {
        let id = BranchId::new();
        assert!(id.to_string().starts_with("branch_"));
    }

    #[test]
    fn test_assemble_defaults() {
        let branch = sample("The cat sat.");
        assert_eq!(branch.version, 1);
        assert!(branch.is_root());
        assert_eq!(branch.collaborators, vec![AuthorId::new("ada")]);
        assert_eq!(branch.metadata.word_count, 3);
        assert_eq!(branch.stats.reading_time, 1);
        assert_eq!(branch.consistency_score(), 100);
        assert!(!branch.is_deleted());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut parent = sample("Once.");
        parent
            .world
            .characters
            .insert("mira", Character::new("mira", "Mira"));

        let mut child = parent.clone();
        if let Some(mira) = child.world.characters.get_mut("mira") {
            mira.status = CharacterStatus::Dead;
        }
        child.world.flags.insert("door_open".into(), FlagValue::Bool(true));

        assert_eq!(
            parent.world.characters.get("mira").map(|c| c.status),
            Some(CharacterStatus::Alive)
        );
        assert!(parent.world.flags.is_empty());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(BranchUpdate::new().is_empty());
        assert!(!BranchUpdate::new().with_title("x").is_empty());
    }
}
