//! BranchManager - the primary public API for the narrative store.
//!
//! Wraps the [`BranchStore`], [`VersionControl`], [`ContinuityEngine`] and an
//! optional repository and generator behind one async interface.
//!
//! Mutations of one branch id are serialized through a per-branch lock;
//! different ids proceed in parallel. Locks are always taken in the order
//! branch lock(s), store, versions.

use crate::branch::{
    AuthorId, Branch, BranchId, BranchUpdate, ContinuityState, MetadataHints, WorldState,
    DELETED_TAG,
};
use crate::config::StoryForgeConfig;
use crate::continuity::{ContinuityEngine, ValidationReport};
use crate::error::{StoryError, StoryResult};
use crate::merge::{merge_bodies, merge_continuity, merge_worlds, MergeStrategy};
use crate::narrative::{
    alternative_tone, ContinuationMode, GenerationError, GenerationOptions, NarrativeGenerator,
    NarrativeOrchestrator,
};
use crate::persist::{BranchRepository, StoryArchive};
use crate::store::{BranchFilter, BranchStore};
use crate::versions::{Snapshot, VersionControl, VersionInfo};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Everything needed to create a branch.
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub author: AuthorId,
    pub title: String,
    pub body: String,
    pub hints: MetadataHints,
    /// `None` creates a root.
    pub parent: Option<BranchId>,
    /// Replaces the world cloned from the parent (or the fresh world of a root).
    pub world: Option<WorldState>,
    /// Replaces the cloned continuity state.
    pub continuity: Option<ContinuityState>,
}

impl NewBranch {
    pub fn new(
        author: impl Into<AuthorId>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            title: title.into(),
            body: body.into(),
            hints: MetadataHints::default(),
            parent: None,
            world: None,
            continuity: None,
        }
    }

    pub fn with_hints(mut self, hints: MetadataHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_parent(mut self, parent: BranchId) -> Self {
        self.parent = Some(parent);
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
}

/// Async lock per branch id.
///
/// An entry is only referenced by the map once no guard or waiter holds it;
/// such entries are dropped on the next acquire.
#[derive(Default)]
struct BranchLocks {
    locks: Mutex<HashMap<BranchId, Arc<Mutex<()>>>>,
}

impl BranchLocks {
    async fn acquire(&self, id: BranchId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|held, lock| *held == id || Arc::strong_count(lock) > 1);
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Lock two ids in a fixed order. The same id is locked once.
    async fn acquire_pair(&self, a: BranchId, b: BranchId) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = vec![a, b];
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await);
        }
        guards
    }
}

/// The branching narrative store.
pub struct BranchManager {
    store: RwLock<BranchStore>,
    versions: RwLock<VersionControl>,
    locks: BranchLocks,
    engine: ContinuityEngine,
    config: StoryForgeConfig,
    repository: Option<Arc<dyn BranchRepository>>,
    pending_sync: Mutex<HashSet<BranchId>>,
    orchestrator: Option<NarrativeOrchestrator>,
}

impl BranchManager {
    /// Create a manager over `store`.
    pub fn new(store: BranchStore, config: StoryForgeConfig) -> Self {
        Self {
            store: RwLock::new(store),
            versions: RwLock::new(VersionControl::new(config.snapshot_limit)),
            locks: BranchLocks::default(),
            engine: ContinuityEngine::new(),
            config,
            repository: None,
            pending_sync: Mutex::new(HashSet::new()),
            orchestrator: None,
        }
    }

    /// Write every change through to `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn BranchRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Enable generation with `generator`, configured from this manager's config.
    pub fn with_generator(mut self, generator: Arc<dyn NarrativeGenerator>) -> Self {
        self.orchestrator = Some(NarrativeOrchestrator::new(generator, &self.config));
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: NarrativeOrchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(&self) -> &StoryForgeConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Option<&NarrativeOrchestrator> {
        self.orchestrator.as_ref()
    }

    // ========================================================================
    // Creation and mutation
    // ========================================================================

    /// Create a root or child branch.
    ///
    /// A child starts from a deep copy of its parent's world and continuity
    /// state and inherits undeclared metadata. It is validated against the
    /// parent; when that finds a major error, continuity notes are appended to
    /// the body before the branch is stored.
    pub async fn create_branch(&self, request: NewBranch) -> StoryResult<Branch> {
        let NewBranch {
            author,
            title,
            body,
            hints,
            parent,
            world,
            continuity,
        } = request;

        let parent = match parent {
            Some(parent_id) => Some(self.get_branch(&parent_id).await?),
            None => None,
        };

        let (hints, world, continuity) = match parent {
            Some(ref parent) => (
                inherited_hints(parent, &hints),
                world.unwrap_or_else(|| parent.world.clone()),
                continuity.unwrap_or_else(|| parent.continuity.clone()),
            ),
            None => (
                live_hints(&hints),
                world.unwrap_or_default(),
                continuity.unwrap_or_default(),
            ),
        };

        let mut branch = Branch::assemble(
            author,
            title,
            body,
            &hints,
            parent.as_ref().map(|p| p.id),
            world,
            continuity,
            self.config.words_per_minute,
        );

        if let Some(ref parent) = parent {
            let report = self.engine.validate(&branch, parent);
            report.apply_to(&mut branch);
            if report.has_major_errors() {
                if let Some(annotated) = self.engine.annotate(&branch.body, &report) {
                    branch.body = annotated;
                    branch.refresh_text_metadata(self.config.words_per_minute);
                }
            }
        }

        let parent_after = self.insert_new(branch.clone()).await?;
        info!(
            branch = %branch.id,
            author = %branch.author_id,
            parent = ?branch.parent_id,
            score = branch.consistency_score(),
            "Created branch"
        );

        self.persist(&branch).await;
        if let Some(ref parent) = parent_after {
            self.persist(parent).await;
        }
        Ok(branch)
    }

    /// Apply `update` to a branch as a new version.
    ///
    /// Only collaborators may update. An empty update returns the branch
    /// unchanged. The deletion tag is dropped from `update.hints`.
    pub async fn update_branch(
        &self,
        id: &BranchId,
        update: BranchUpdate,
        actor: &AuthorId,
    ) -> StoryResult<Branch> {
        let _guard = self.locks.acquire(*id).await;
        let current = self.live_branch(id).await?;
        if !current.is_collaborator(actor) {
            return Err(StoryError::unauthorized(actor, *id, "update"));
        }
        if update.is_empty() {
            return Ok(current);
        }

        let next = self.next_version(current, update).await;
        self.commit(next).await
    }

    /// Logically delete a branch. Only the author may delete.
    ///
    /// The record stays resolvable for children and snapshots; it is tagged,
    /// unpublished and dropped from the author index. Deleting twice is a no-op.
    pub async fn delete_branch(&self, id: &BranchId, actor: &AuthorId) -> StoryResult<()> {
        let _guard = self.locks.acquire(*id).await;
        let mut branch = self.get_branch(id).await?;
        if &branch.author_id != actor {
            return Err(StoryError::unauthorized(actor, *id, "delete"));
        }
        if branch.is_deleted() {
            return Ok(());
        }

        branch.metadata.tags.push(DELETED_TAG.to_string());
        branch.is_published = false;
        branch.published_at = None;
        branch.updated_at = Utc::now();

        let stored = {
            let mut store = self.store.write().await;
            store.replace(branch)?;
            store.remove_from_author_index(id);
            store.get(id).cloned()
        };

        info!(branch = %id, actor = %actor, "Deleted branch");
        if let Some(ref stored) = stored {
            self.persist(stored).await;
        }
        Ok(())
    }

    /// Mark a branch as published. Only the author may publish.
    pub async fn publish_branch(&self, id: &BranchId, actor: &AuthorId) -> StoryResult<Branch> {
        let _guard = self.locks.acquire(*id).await;
        let mut branch = self.live_branch(id).await?;
        if &branch.author_id != actor {
            return Err(StoryError::unauthorized(actor, *id, "publish"));
        }

        let now = Utc::now();
        branch.is_published = true;
        branch.published_at = Some(now);
        branch.updated_at = now;

        let stored = self.swap(branch).await?;
        info!(branch = %id, "Published branch");
        self.persist(&stored).await;
        Ok(stored)
    }

    /// Let `collaborator` edit a branch. Only the author may share.
    pub async fn add_collaborator(
        &self,
        id: &BranchId,
        actor: &AuthorId,
        collaborator: AuthorId,
    ) -> StoryResult<Branch> {
        let _guard = self.locks.acquire(*id).await;
        let mut branch = self.live_branch(id).await?;
        if &branch.author_id != actor {
            return Err(StoryError::unauthorized(actor, *id, "share"));
        }
        if branch.is_collaborator(&collaborator) {
            return Ok(branch);
        }

        branch.collaborators.push(collaborator);
        branch.updated_at = Utc::now();

        let stored = self.swap(branch).await?;
        self.persist(&stored).await;
        Ok(stored)
    }

    /// Merge `source` into a new branch beside `target`.
    ///
    /// The result is parented like the target and authored by `actor`, who
    /// must collaborate on the target. Neither input is modified.
    pub async fn merge_branches(
        &self,
        source_id: &BranchId,
        target_id: &BranchId,
        actor: &AuthorId,
        strategy: MergeStrategy,
    ) -> StoryResult<Branch> {
        let _guards = self.locks.acquire_pair(*source_id, *target_id).await;
        let source = self.live_branch(source_id).await?;
        let target = self.live_branch(target_id).await?;
        if !target.is_collaborator(actor) {
            return Err(StoryError::unauthorized(actor, *target_id, "merge into"));
        }

        let mut merged = Branch::assemble(
            actor.clone(),
            format!("Merged: {}", target.title),
            merge_bodies(&target.body, &source.body, strategy),
            &live_hints(&MetadataHints::from(&target.metadata)),
            target.parent_id,
            merge_worlds(&target.world, &source.world, strategy),
            merge_continuity(&target.continuity, &source.continuity, strategy),
            self.config.words_per_minute,
        );

        let report = self.engine.validate_merge(&merged, &source, &target);
        report.apply_to(&mut merged);

        let parent_after = self.insert_new(merged.clone()).await?;
        info!(
            branch = %merged.id,
            source = %source_id,
            target = %target_id,
            %strategy,
            score = merged.consistency_score(),
            "Merged branches"
        );

        self.persist(&merged).await;
        if let Some(ref parent) = parent_after {
            self.persist(parent).await;
        }
        Ok(merged)
    }

    /// A new branch equal to a retained snapshot.
    ///
    /// Title, body, metadata, world and continuity come from the snapshot; the
    /// new branch is parented like the snapshot and owned by `actor`. History
    /// is not touched.
    pub async fn branch_from_version(
        &self,
        id: &BranchId,
        version: u32,
        actor: &AuthorId,
    ) -> StoryResult<Branch> {
        let historical = self.get_snapshot(id, version).await?.branch;

        let mut branch = Branch::assemble(
            actor.clone(),
            historical.title,
            historical.body,
            &MetadataHints::default(),
            historical.parent_id,
            historical.world,
            historical.continuity,
            self.config.words_per_minute,
        );
        branch.metadata = historical.metadata;
        branch.stats.reading_time = branch.metadata.reading_time_minutes;

        let parent_after = self.insert_new(branch.clone()).await?;
        info!(branch = %branch.id, from = %id, version, "Branched from version");

        self.persist(&branch).await;
        if let Some(ref parent) = parent_after {
            self.persist(parent).await;
        }
        Ok(branch)
    }

    /// Restore the state at `version` as a new version of the same branch.
    ///
    /// The current state is snapshotted first, so the rollback can itself be
    /// undone. The version number keeps increasing.
    pub async fn rollback_branch(
        &self,
        id: &BranchId,
        version: u32,
        actor: &AuthorId,
    ) -> StoryResult<Branch> {
        let _guard = self.locks.acquire(*id).await;
        let current = self.live_branch(id).await?;
        if !current.is_collaborator(actor) {
            return Err(StoryError::unauthorized(actor, *id, "roll back"));
        }

        let historical = self.versions.write().await.rollback(&current, version)?;
        let update = BranchUpdate::new()
            .with_title(historical.title)
            .with_body(historical.body)
            .with_hints(MetadataHints::from(&historical.metadata))
            .with_world(historical.world)
            .with_continuity(historical.continuity);

        let next = self.next_version(current, update).await;
        let stored = self.commit(next).await?;
        info!(branch = %id, restored = version, version = stored.version, "Rolled back branch");
        Ok(stored)
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Generate new text for a branch.
    ///
    /// `Continue` appends to the branch as a new version; `Branch` and
    /// `Alternate` create a child holding the generated text. The branch is
    /// read, the lock released for the generator call, then re-checked: if
    /// its version moved in the meantime the result is discarded with
    /// `StaleWrite`.
    pub async fn continue_branch(
        &self,
        id: &BranchId,
        actor: &AuthorId,
        mode: ContinuationMode,
        options: GenerationOptions,
    ) -> StoryResult<Branch> {
        let orchestrator = self.orchestrator.as_ref().ok_or_else(|| {
            GenerationError::Unavailable("No narrative generator configured".to_string())
        })?;

        let read = {
            let _guard = self.locks.acquire(*id).await;
            let branch = self.live_branch(id).await?;
            if mode == ContinuationMode::Continue && !branch.is_collaborator(actor) {
                return Err(StoryError::unauthorized(actor, *id, "continue"));
            }
            branch
        };

        let text = orchestrator.continue_from(&read, mode, options).await?;

        let guard = self.locks.acquire(*id).await;
        let current = self.live_branch(id).await?;
        if current.version != read.version {
            warn!(
                branch = %id,
                expected = read.version,
                found = current.version,
                "Discarding generation for a branch that changed"
            );
            return Err(StoryError::StaleWrite {
                branch_id: *id,
                expected: read.version,
                found: current.version,
            });
        }

        match mode {
            ContinuationMode::Continue => {
                let body = if current.body.trim().is_empty() {
                    text
                } else {
                    format!("{}\n\n{}", current.body, text)
                };
                let next = self
                    .next_version(current, BranchUpdate::new().with_body(body))
                    .await;
                self.commit(next).await
            }
            ContinuationMode::Branch | ContinuationMode::Alternate => {
                let (suffix, hints) = if mode == ContinuationMode::Alternate {
                    let tone = alternative_tone(&current.metadata.tone);
                    ("alternate", MetadataHints::new().tone(tone))
                } else {
                    ("continued", MetadataHints::new())
                };
                drop(guard);
                self.create_branch(
                    NewBranch::new(actor.clone(), format!("{} ({suffix})", current.title), text)
                        .with_hints(hints)
                        .with_parent(*id),
                )
                .await
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A branch from memory, deleted ones included.
    pub async fn get_branch(&self, id: &BranchId) -> StoryResult<Branch> {
        self.store
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoryError::branch_not_found(*id))
    }

    /// Every branch reachable from `root`, breadth first.
    pub async fn get_branch_tree(&self, root: &BranchId) -> StoryResult<Vec<Branch>> {
        let store = self.store.read().await;
        if !store.contains(root) {
            return Err(StoryError::branch_not_found(*root));
        }
        Ok(store.tree(root))
    }

    pub async fn search_branches(&self, filter: &BranchFilter) -> Vec<Branch> {
        self.store.read().await.search(filter)
    }

    /// Live branches written by `author`.
    pub async fn branches_by_author(&self, author: &AuthorId) -> Vec<Branch> {
        self.store
            .read()
            .await
            .by_author(author)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Validate a branch against its parent. Roots validate clean.
    pub async fn validate_branch(&self, id: &BranchId) -> StoryResult<ValidationReport> {
        let branch = self.get_branch(id).await?;
        let Some(parent_id) = branch.parent_id else {
            let quality = self.engine.quality(&branch, 100);
            return Ok(ValidationReport::clean(branch.id, quality));
        };
        let parent = self.get_branch(&parent_id).await.map_err(|_| {
            StoryError::ValidationFailed(format!("Parent {parent_id} of {id} is not available"))
        })?;
        Ok(self.engine.validate(&branch, &parent))
    }

    pub async fn list_versions(&self, id: &BranchId) -> Vec<VersionInfo> {
        self.versions.read().await.list_versions(id)
    }

    /// The retained snapshot recorded for `version`.
    ///
    /// Lookup is by version number, not by position in the retained window:
    /// once old snapshots are evicted, `version` may exceed the number kept
    /// and still resolve. Evicted versions are `NotFound`.
    pub async fn get_snapshot(&self, id: &BranchId, version: u32) -> StoryResult<Snapshot> {
        self.versions
            .read()
            .await
            .get_snapshot(id, version)
            .cloned()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Ids whose last save failed, sorted.
    pub async fn pending_sync(&self) -> Vec<BranchId> {
        let mut ids: Vec<BranchId> = self.pending_sync.lock().await.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Retry saving every branch whose last save failed.
    ///
    /// Returns how many were saved. Branches that fail again stay pending and
    /// the last failure is returned.
    pub async fn sync_pending(&self) -> StoryResult<usize> {
        let Some(ref repository) = self.repository else {
            return Ok(0);
        };

        let pending: Vec<BranchId> = self.pending_sync.lock().await.drain().collect();
        let branches: Vec<Branch> = {
            let store = self.store.read().await;
            pending
                .iter()
                .filter_map(|id| store.get(id).cloned())
                .collect()
        };

        let results = join_all(branches.iter().map(|b| repository.save(b))).await;

        let mut synced = 0;
        let mut last_error = None;
        let mut still_pending = self.pending_sync.lock().await;
        for (branch, result) in branches.iter().zip(results) {
            match result {
                Ok(()) => synced += 1,
                Err(err) => {
                    still_pending.insert(branch.id);
                    last_error = Some(err);
                }
            }
        }
        drop(still_pending);

        match last_error {
            Some(err) => {
                warn!(synced, error = %err, "Repository still unavailable");
                Err(err.into())
            }
            None => {
                debug!(synced, "Synced pending branches");
                Ok(synced)
            }
        }
    }

    /// A branch from memory, falling back to the repository.
    ///
    /// A branch found in the repository is cached.
    pub async fn fetch_branch(&self, id: &BranchId) -> StoryResult<Branch> {
        if let Some(branch) = self.store.read().await.get(id).cloned() {
            return Ok(branch);
        }
        let Some(ref repository) = self.repository else {
            return Err(StoryError::branch_not_found(*id));
        };

        let branch = repository
            .load(id)
            .await?
            .ok_or_else(|| StoryError::branch_not_found(*id))?;
        self.store.write().await.cache(branch.clone());
        debug!(branch = %id, "Loaded branch from repository");
        Ok(branch)
    }

    /// Load every stored branch by `author` that is not yet in memory.
    ///
    /// Returns how many were loaded.
    pub async fn hydrate_author(&self, author: &AuthorId) -> StoryResult<usize> {
        let Some(ref repository) = self.repository else {
            return Ok(0);
        };

        let found = repository.list_by_author(author).await?;
        let mut store = self.store.write().await;
        let mut loaded = 0;
        for branch in found {
            if !store.contains(&branch.id) {
                store.cache(branch);
                loaded += 1;
            }
        }
        debug!(author = %author, loaded, "Hydrated author");
        Ok(loaded)
    }

    /// Every branch and retained snapshot.
    pub async fn export_archive(&self) -> StoryArchive {
        let mut branches: Vec<Branch> = self.store.read().await.iter().cloned().collect();
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let snapshots = self.versions.read().await.export();
        StoryArchive::new(branches, snapshots)
    }

    /// Load an archive into memory, replacing records with the same id.
    ///
    /// Returns how many branches were loaded.
    pub async fn import_archive(&self, archive: StoryArchive) -> usize {
        let count = archive.branches.len();
        {
            let mut store = self.store.write().await;
            let mut versions = self.versions.write().await;
            for branch in archive.branches {
                store.cache(branch);
            }
            versions.import(archive.snapshots);
        }
        info!(branches = count, "Imported archive");
        count
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// A branch that exists and is not deleted.
    async fn live_branch(&self, id: &BranchId) -> StoryResult<Branch> {
        let branch = self.get_branch(id).await?;
        if branch.is_deleted() {
            return Err(StoryError::NotFound {
                what: format!("Branch {id} (deleted)"),
            });
        }
        Ok(branch)
    }

    /// `current` with `update` applied, its version bumped and its score
    /// recomputed against the parent.
    async fn next_version(&self, current: Branch, update: BranchUpdate) -> Branch {
        let parent = match current.parent_id {
            Some(ref parent_id) => self.store.read().await.get(parent_id).cloned(),
            None => None,
        };

        let mut next = current;
        let BranchUpdate {
            title,
            body,
            hints,
            world,
            continuity,
            narrative_tension,
        } = update;

        if let Some(title) = title {
            next.title = title;
        }
        if let Some(body) = body {
            next.body = body;
            next.refresh_text_metadata(self.config.words_per_minute);
        }
        if let Some(ref hints) = hints {
            next.metadata.apply_hints(&live_hints(hints));
        }
        if let Some(world) = world {
            next.world = world;
        }
        if let Some(continuity) = continuity {
            next.continuity = continuity;
        }
        if let Some(tension) = narrative_tension {
            next.continuity.set_tension(tension);
        }

        next.version += 1;
        next.updated_at = Utc::now();

        if let Some(ref parent) = parent {
            self.engine.validate(&next, parent).apply_to(&mut next);
        }
        next
    }

    /// Store a new state of an existing branch and snapshot it in the same
    /// critical section.
    async fn commit(&self, branch: Branch) -> StoryResult<Branch> {
        let id = branch.id;
        let stored = {
            let mut store = self.store.write().await;
            let mut versions = self.versions.write().await;
            store.replace(branch)?;
            let stored = store
                .get(&id)
                .cloned()
                .ok_or_else(|| StoryError::branch_not_found(id))?;
            versions.snapshot(&stored);
            stored
        };

        debug!(
            branch = %id,
            version = stored.version,
            score = stored.consistency_score(),
            "Committed version"
        );
        self.persist(&stored).await;
        Ok(stored)
    }

    /// Store a new state without a new version.
    async fn swap(&self, branch: Branch) -> StoryResult<Branch> {
        let id = branch.id;
        let mut store = self.store.write().await;
        store.replace(branch)?;
        store
            .get(&id)
            .cloned()
            .ok_or_else(|| StoryError::branch_not_found(id))
    }

    /// Insert a new branch, link it under its parent and take its first
    /// snapshot. Returns the updated parent.
    async fn insert_new(&self, branch: Branch) -> StoryResult<Option<Branch>> {
        let mut store = self.store.write().await;
        let mut versions = self.versions.write().await;
        let (id, parent_id) = (branch.id, branch.parent_id);
        store.insert(branch)?;
        if let Some(stored) = store.get(&id) {
            versions.snapshot(stored);
        }
        Ok(parent_id.and_then(|pid| store.get(&pid).cloned()))
    }

    /// Save to the repository. A failure leaves the branch served from memory
    /// and queued for [`BranchManager::sync_pending`].
    async fn persist(&self, branch: &Branch) {
        let Some(ref repository) = self.repository else {
            return;
        };
        if let Err(err) = repository.save(branch).await {
            warn!(
                branch = %branch.id,
                error = %err,
                "Repository save failed, keeping branch in memory"
            );
            self.pending_sync.lock().await.insert(branch.id);
        }
    }
}

/// Parent metadata overridden by the child's own hints, without the
/// deletion marker.
fn inherited_hints(parent: &Branch, own: &MetadataHints) -> MetadataHints {
    let mut metadata = parent.metadata.clone();
    metadata.apply_hints(own);
    live_hints(&MetadataHints::from(&metadata))
}

/// Caller hints with the deletion marker removed. Only `delete_branch` may
/// set it.
fn live_hints(hints: &MetadataHints) -> MetadataHints {
    let mut hints = hints.clone();
    if let Some(ref mut tags) = hints.tags {
        tags.retain(|t| t != DELETED_TAG);
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BranchManager {
        BranchManager::new(BranchStore::new(), StoryForgeConfig::default())
    }

    #[tokio::test]
    async fn test_lock_pair_same_id_locks_once() {
        let locks = BranchLocks::default();
        let id = BranchId::new();
        let guards = locks.acquire_pair(id, id).await;
        assert_eq!(guards.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_released() {
        let locks = BranchLocks::default();
        let (a, b, c) = (BranchId::new(), BranchId::new(), BranchId::new());

        drop(locks.acquire(a).await);
        let held = locks.acquire(b).await;
        assert_eq!(locks.len().await, 1);

        drop(locks.acquire(c).await);
        assert_eq!(locks.len().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn test_child_inherits_metadata_without_deleted_tag() {
        let manager = manager();
        let root = manager
            .create_branch(
                NewBranch::new("ada", "Root", "The harbor slept.").with_hints(
                    MetadataHints::new()
                        .genre("noir")
                        .tone("dark")
                        .tags(["harbor"]),
                ),
            )
            .await
            .unwrap();
        manager.delete_branch(&root.id, &"ada".into()).await.unwrap();

        let child = manager
            .create_branch(
                NewBranch::new("bo", "Child", "A bell rang.")
                    .with_parent(root.id)
                    .with_hints(MetadataHints::new().tone("hopeful")),
            )
            .await
            .unwrap();

        assert_eq!(child.metadata.genre, "noir");
        assert_eq!(child.metadata.tone, "hopeful");
        assert_eq!(child.metadata.tags, vec!["harbor".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_update_keeps_version() {
        let manager = manager();
        let root = manager
            .create_branch(NewBranch::new("ada", "Root", "Words."))
            .await
            .unwrap();
        let same = manager
            .update_branch(&root.id, BranchUpdate::new(), &"ada".into())
            .await
            .unwrap();
        assert_eq!(same.version, 1);
    }

    #[tokio::test]
    async fn test_continue_without_generator_fails() {
        let manager = manager();
        let root = manager
            .create_branch(NewBranch::new("ada", "Root", "Words."))
            .await
            .unwrap();
        let err = manager
            .continue_branch(
                &root.id,
                &"ada".into(),
                ContinuationMode::Continue,
                GenerationOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoryError::GenerationFailed(_)));
    }
}
