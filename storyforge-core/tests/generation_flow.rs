//! Generated continuations, repository degradation and archives.

use std::sync::Arc;
use storyforge_core::branch::{Character, WorldState};
use storyforge_core::narrative::{ContinuationMode, GenerationError, GenerationOptions};
use storyforge_core::testing::{assert_child_of, StoryHarness, UnavailableRepository};
use storyforge_core::{
    AuthorId, BranchManager, BranchRepository, BranchStore, BranchUpdate, InMemoryRepository,
    JsonDirectoryRepository, MetadataHints, NewBranch, StoryArchive, StoryError,
    StoryForgeConfig,
};
use tempfile::TempDir;
use tokio::sync::Notify;

fn ada() -> AuthorId {
    AuthorId::new("ada")
}

async fn harbor(harness: &StoryHarness) -> storyforge_core::Branch {
    let mut world = WorldState::default();
    world.characters.insert("mira", Character::new("mira", "Mira"));
    harness
        .manager
        .create_branch(
            NewBranch::new("ada", "Harbor", "Mira waited by the door.")
                .with_hints(MetadataHints::new().genre("mystery").tone("dark"))
                .with_world(world),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_continue_appends_a_new_version() {
    let harness = StoryHarness::new();
    let root = harbor(&harness).await;
    harness.expect_text("mira found the key.");

    let next = harness
        .manager
        .continue_branch(
            &root.id,
            &ada(),
            ContinuationMode::Continue,
            GenerationOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(next.id, root.id);
    assert_eq!(next.version, 2);
    assert_eq!(next.body, "Mira waited by the door.\n\nMira found the key.");
    assert_eq!(next.metadata.word_count, 9);

    let request = harness.generator.last_request().unwrap();
    assert!(request.prompt.contains("Continue from: \"...Mira waited by the door.\""));
    assert!(request.prompt.contains("Genre: mystery"));
}

#[tokio::test]
async fn test_branch_and_alternate_create_children() {
    let harness = StoryHarness::new();
    let root = harbor(&harness).await;
    harness.expect_text("The tide turned.");
    harness.expect_text("Sunlight spilled over the quay.");

    let forked = harness
        .manager
        .continue_branch(
            &root.id,
            &"bo".into(),
            ContinuationMode::Branch,
            GenerationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(forked.title, "Harbor (continued)");
    assert_eq!(forked.body, "The tide turned.");
    assert_eq!(forked.author_id, AuthorId::new("bo"));

    let alternate = harness
        .manager
        .continue_branch(
            &root.id,
            &ada(),
            ContinuationMode::Alternate,
            GenerationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(alternate.metadata.tone, "light");
    assert_eq!(alternate.metadata.genre, "mystery");
    assert!(harness
        .generator
        .last_request()
        .unwrap()
        .prompt
        .contains("Tone: light"));

    let root = harness.branch(&root.id).await.unwrap();
    assert_eq!(root.version, 1);
    assert_child_of(&root, &forked);
    assert_child_of(&root, &alternate);
}

#[tokio::test]
async fn test_continue_requires_collaborator() {
    let harness = StoryHarness::new();
    let root = harbor(&harness).await;

    let result = harness
        .manager
        .continue_branch(
            &root.id,
            &"bo".into(),
            ContinuationMode::Continue,
            GenerationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(StoryError::Unauthorized { .. })));
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn test_edit_during_generation_is_a_stale_write() {
    let harness = StoryHarness::new();
    let root = harbor(&harness).await;
    let gate = Arc::new(Notify::new());
    harness.generator.push_gated(gate.clone(), "Too late.");

    let task = tokio::spawn({
        let manager = harness.manager.clone();
        let id = root.id;
        async move {
            manager
                .continue_branch(
                    &id,
                    &AuthorId::new("ada"),
                    ContinuationMode::Continue,
                    GenerationOptions::new(),
                )
                .await
        }
    });

    while harness.generator.calls() == 0 {
        tokio::task::yield_now().await;
    }
    let edited = harness
        .manager
        .update_branch(
            &root.id,
            BranchUpdate::new().with_body("Mira left the harbor."),
            &ada(),
        )
        .await
        .unwrap();
    gate.notify_one();

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(StoryError::StaleWrite {
            expected: 1,
            found: 2,
            ..
        })
    ));
    let current = harness.branch(&root.id).await.unwrap();
    assert_eq!(current.body, edited.body);
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn test_generation_failure_leaves_branch_untouched() {
    let harness = StoryHarness::new();
    let root = harbor(&harness).await;
    harness
        .generator
        .push_failure(GenerationError::Rejected("content policy".into()));

    let result = harness
        .manager
        .continue_branch(
            &root.id,
            &ada(),
            ContinuationMode::Continue,
            GenerationOptions::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(StoryError::GenerationFailed(GenerationError::Rejected(_)))
    ));
    assert_eq!(harness.branch(&root.id).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_unavailable_repository_degrades_to_memory() {
    let repository = Arc::new(UnavailableRepository::new());
    let harness = StoryHarness::with_repository(repository.clone());

    let root = harness.root("ada", "Root", "Still here.").await.unwrap();
    let child = harness.child(&root.id, "ada", "Also here.").await.unwrap();
    assert_eq!(harness.branch(&child.id).await.unwrap().body, "Also here.");

    let mut expected = vec![root.id, child.id];
    expected.sort();
    assert_eq!(harness.manager.pending_sync().await, expected);

    let retry = harness.manager.sync_pending().await;
    assert!(matches!(retry, Err(StoryError::StorageUnavailable(_))));
    assert_eq!(harness.manager.pending_sync().await.len(), 2);

    repository.recover();
    assert_eq!(harness.manager.sync_pending().await.unwrap(), 2);
    assert!(harness.manager.pending_sync().await.is_empty());
    assert_eq!(repository.inner().len().await, 2);
}

#[tokio::test]
async fn test_fetch_falls_back_to_repository() {
    let repository = Arc::new(InMemoryRepository::new());
    let writer = StoryHarness::with_repository(repository.clone());
    let root = writer.root("ada", "Root", "Saved once.").await.unwrap();

    let reader = StoryHarness::with_repository(repository.clone());
    assert!(reader.manager.get_branch(&root.id).await.is_err());

    let fetched = reader.manager.fetch_branch(&root.id).await.unwrap();
    assert_eq!(fetched.body, "Saved once.");
    assert!(reader.manager.get_branch(&root.id).await.is_ok());

    let offline = StoryHarness::with_repository(Arc::new(UnavailableRepository::new()));
    let result = offline.manager.fetch_branch(&root.id).await;
    assert!(matches!(result, Err(StoryError::StorageUnavailable(_))));
}

#[tokio::test]
async fn test_json_directory_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path().join("branches");

    let (root_id, child_id) = {
        let repository = JsonDirectoryRepository::open(&dir).await.unwrap();
        let manager = BranchManager::new(BranchStore::new(), StoryForgeConfig::default())
            .with_repository(Arc::new(repository));
        let root = manager
            .create_branch(NewBranch::new("ada", "Root", "Written to disk."))
            .await
            .unwrap();
        let child = manager
            .create_branch(NewBranch::new("ada", "Child", "Also on disk.").with_parent(root.id))
            .await
            .unwrap();
        (root.id, child.id)
    };

    let repository = JsonDirectoryRepository::open(&dir).await.unwrap();
    assert_eq!(repository.list_by_author(&ada()).await.unwrap().len(), 2);

    let manager = BranchManager::new(BranchStore::new(), StoryForgeConfig::default())
        .with_repository(Arc::new(repository));
    assert_eq!(manager.hydrate_author(&ada()).await.unwrap(), 2);
    assert_eq!(manager.hydrate_author(&ada()).await.unwrap(), 0);

    let tree: Vec<_> = manager
        .get_branch_tree(&root_id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(tree, vec![root_id, child_id]);
}

#[tokio::test]
async fn test_archive_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("archive.json");

    let source = StoryHarness::new();
    let root = source.root("ada", "Root", "First.").await.unwrap();
    source
        .manager
        .update_branch(&root.id, BranchUpdate::new().with_body("Second."), &ada())
        .await
        .unwrap();
    source.child(&root.id, "bo", "Third.").await.unwrap();

    source
        .manager
        .export_archive()
        .await
        .save_json(&path)
        .await
        .unwrap();

    let archive = StoryArchive::load_json(&path).await.unwrap();
    let restored = StoryHarness::new();
    assert_eq!(restored.manager.import_archive(archive).await, 2);

    let root_again = restored.branch(&root.id).await.unwrap();
    assert_eq!(root_again.body, "Second.");
    assert_eq!(root_again.children.len(), 1);
    assert_eq!(restored.manager.list_versions(&root.id).await.len(), 2);
    assert_eq!(
        restored.manager.branches_by_author(&"bo".into()).await.len(),
        1
    );
}
