//! Creation, mutation, deletion and history of branches.

use std::sync::Arc;
use storyforge_core::branch::{
    Character, CharacterStatus, Complexity, ContinuityState, Fact, WorldState,
};
use storyforge_core::testing::{
    assert_character_status, assert_child_of, assert_not_found, assert_score_below,
    assert_unauthorized,
};
use storyforge_core::versions::SnapshotReason;
use storyforge_core::{
    AuthorId, BranchFilter, BranchManager, BranchStore, BranchUpdate, MetadataHints, NewBranch,
    StoryForgeConfig,
};

fn manager() -> BranchManager {
    BranchManager::new(BranchStore::new(), StoryForgeConfig::default())
}

fn ada() -> AuthorId {
    AuthorId::new("ada")
}

fn world_with(id: &str, name: &str, status: CharacterStatus) -> WorldState {
    let mut world = WorldState::default();
    world
        .characters
        .insert(id, Character::new(id, name).with_status(status));
    world
}

#[tokio::test]
async fn test_three_word_root() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Opening", "The cat sat."))
        .await
        .unwrap();

    assert!(root.is_root());
    assert_eq!(root.version, 1);
    assert_eq!(root.metadata.word_count, 3);
    assert_eq!(root.metadata.reading_time_minutes, 1);
    assert_eq!(root.metadata.complexity, Complexity::Simple);
    assert_eq!(root.consistency_score(), 100);
}

#[tokio::test]
async fn test_child_is_linked_under_parent() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "Fog rolled in."))
        .await
        .unwrap();
    let child = manager
        .create_branch(NewBranch::new("bo", "Child", "A bell rang.").with_parent(root.id))
        .await
        .unwrap();

    let parent = manager.get_branch(&root.id).await.unwrap();
    assert_child_of(&parent, &child);
}

#[tokio::test]
async fn test_missing_parent_is_not_found() {
    let manager = manager();
    let result = manager
        .create_branch(
            NewBranch::new("ada", "Orphan", "Alone.")
                .with_parent(storyforge_core::BranchId::new()),
        )
        .await;

    assert_not_found(&result);
    assert!(manager.search_branches(&BranchFilter::new()).await.is_empty());
}

#[tokio::test]
async fn test_versions_strictly_increase() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "One."))
        .await
        .unwrap();

    let mut last = root.version;
    for body in ["Two words.", "Now three words.", "And now four words."] {
        let updated = manager
            .update_branch(&root.id, BranchUpdate::new().with_body(body), &ada())
            .await
            .unwrap();
        assert!(updated.version > last);
        last = updated.version;
    }
    assert_eq!(last, 4);

    let current = manager.get_branch(&root.id).await.unwrap();
    assert_eq!(current.metadata.word_count, 4);
}

#[tokio::test]
async fn test_child_state_is_a_deep_copy() {
    let manager = manager();
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "Mira waited.")
                .with_world(world_with("mira", "Mira", CharacterStatus::Alive)),
        )
        .await
        .unwrap();
    let child = manager
        .create_branch(NewBranch::new("ada", "Child", "Mira left.").with_parent(root.id))
        .await
        .unwrap();

    let mut world = child.world.clone();
    world
        .characters
        .insert("tom", Character::new("tom", "Tom"));
    if let Some(mira) = world.characters.get_mut("mira") {
        mira.status = CharacterStatus::Transformed;
    }
    manager
        .update_branch(&child.id, BranchUpdate::new().with_world(world), &ada())
        .await
        .unwrap();

    let parent = manager.get_branch(&root.id).await.unwrap();
    assert_eq!(parent.world.characters.len(), 1);
    assert_character_status(&parent, "mira", CharacterStatus::Alive);
}

#[tokio::test]
async fn test_resurrection_lowers_score() {
    let manager = manager();
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "Mira fell.")
                .with_world(world_with("mira", "Mira", CharacterStatus::Dead)),
        )
        .await
        .unwrap();
    let child = manager
        .create_branch(
            NewBranch::new("ada", "Child", "Mira walked in.")
                .with_parent(root.id)
                .with_world(world_with("mira", "Mira", CharacterStatus::Alive)),
        )
        .await
        .unwrap();

    assert_score_below(&child, 100);
    let report = manager.validate_branch(&child.id).await.unwrap();
    assert_eq!(report.character_inconsistencies.len(), 1);
    assert_eq!(report.continuity_score, 93);
}

#[tokio::test]
async fn test_major_contradiction_is_annotated() {
    let manager = manager();
    let mut parent_facts = ContinuityState::default();
    parent_facts.assert_fact(Fact::new("gate", "The gate is open"));
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "The gate stood wide.").with_continuity(parent_facts),
        )
        .await
        .unwrap();

    let mut child_facts = ContinuityState::default();
    child_facts.assert_fact(Fact::new("gate_shut", "The gate is not open"));
    let child = manager
        .create_branch(
            NewBranch::new("ada", "Child", "The gate was shut.")
                .with_parent(root.id)
                .with_continuity(child_facts),
        )
        .await
        .unwrap();

    assert!(child.body.starts_with("The gate was shut."));
    assert!(child.body.contains("[Continuity note: "));
    assert_eq!(child.continuity.contradictions.len(), 1);
    assert_eq!(child.consistency_score(), 95);
}

#[tokio::test]
async fn test_only_collaborators_update() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "Words."))
        .await
        .unwrap();
    let bo = AuthorId::new("bo");

    let denied = manager
        .update_branch(&root.id, BranchUpdate::new().with_title("Mine"), &bo)
        .await;
    assert_unauthorized(&denied);
    assert_eq!(manager.get_branch(&root.id).await.unwrap().version, 1);

    let shared = manager
        .add_collaborator(&root.id, &bo, bo.clone())
        .await;
    assert_unauthorized(&shared);

    manager
        .add_collaborator(&root.id, &ada(), bo.clone())
        .await
        .unwrap();
    let updated = manager
        .update_branch(&root.id, BranchUpdate::new().with_title("Ours"), &bo)
        .await
        .unwrap();
    assert_eq!(updated.title, "Ours");
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn test_delete_is_logical() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "Words."))
        .await
        .unwrap();
    let child = manager
        .create_branch(NewBranch::new("ada", "Child", "More.").with_parent(root.id))
        .await
        .unwrap();
    manager.publish_branch(&root.id, &ada()).await.unwrap();

    assert_unauthorized(&manager.delete_branch(&root.id, &"bo".into()).await);
    manager.delete_branch(&root.id, &ada()).await.unwrap();
    manager.delete_branch(&root.id, &ada()).await.unwrap();

    let deleted = manager.get_branch(&root.id).await.unwrap();
    assert!(deleted.is_deleted());
    assert!(!deleted.is_published);
    assert_eq!(deleted.children, vec![child.id]);
    assert!(manager.get_snapshot(&root.id, 1).await.is_ok());

    let live: Vec<_> = manager
        .branches_by_author(&ada())
        .await
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(live, vec![child.id]);

    let updated = manager
        .update_branch(&root.id, BranchUpdate::new().with_title("Back"), &ada())
        .await;
    assert_not_found(&updated);
}

#[tokio::test]
async fn test_deleted_tag_is_reserved_for_delete() {
    let manager = manager();
    let bo = AuthorId::new("bo");
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "Words.")
                .with_hints(MetadataHints::new().tags(["deleted", "harbor"])),
        )
        .await
        .unwrap();
    assert!(!root.is_deleted());
    assert_eq!(root.metadata.tags, vec!["harbor".to_string()]);

    manager
        .add_collaborator(&root.id, &ada(), bo.clone())
        .await
        .unwrap();
    assert_unauthorized(&manager.delete_branch(&root.id, &bo).await);

    let tagged = manager
        .update_branch(
            &root.id,
            BranchUpdate::new().with_hints(MetadataHints::new().tags(["deleted", "rain"])),
            &bo,
        )
        .await
        .unwrap();
    assert!(!tagged.is_deleted());
    assert_eq!(tagged.metadata.tags, vec!["rain".to_string()]);
    assert_eq!(manager.branches_by_author(&ada()).await.len(), 1);
    assert_eq!(
        manager
            .search_branches(&BranchFilter::new().any_tag("rain"))
            .await
            .len(),
        1
    );

    let renamed = manager
        .update_branch(&root.id, BranchUpdate::new().with_title("Still here"), &ada())
        .await
        .unwrap();
    assert_eq!(renamed.version, 3);
}

#[tokio::test]
async fn test_branch_from_version_round_trip() {
    let manager = manager();
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "First draft.")
                .with_hints(MetadataHints::new().genre("mystery")),
        )
        .await
        .unwrap();
    let v2 = manager
        .update_branch(
            &root.id,
            BranchUpdate::new()
                .with_title("Second")
                .with_body("A longer second draft of the opening."),
            &ada(),
        )
        .await
        .unwrap();

    let copy = manager
        .branch_from_version(&root.id, 2, &"bo".into())
        .await
        .unwrap();

    assert_ne!(copy.id, root.id);
    assert_eq!(copy.title, v2.title);
    assert_eq!(copy.body, v2.body);
    assert_eq!(copy.metadata, v2.metadata);
    assert_eq!(copy.parent_id, None);
    assert_eq!(manager.get_branch(&root.id).await.unwrap().version, 2);

    assert_not_found(&manager.branch_from_version(&root.id, 9, &ada()).await);
}

#[tokio::test]
async fn test_snapshot_boundaries() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "v1"))
        .await
        .unwrap();
    for n in 2..=50 {
        manager
            .update_branch(
                &root.id,
                BranchUpdate::new().with_body(format!("v{n}")),
                &ada(),
            )
            .await
            .unwrap();
    }

    assert_eq!(manager.list_versions(&root.id).await.len(), 50);
    assert_not_found(&manager.get_snapshot(&root.id, 0).await);
    assert_not_found(&manager.get_snapshot(&root.id, 51).await);
    assert_eq!(manager.get_snapshot(&root.id, 1).await.unwrap().branch.body, "v1");
    assert_eq!(manager.get_snapshot(&root.id, 50).await.unwrap().branch.body, "v50");

    manager
        .update_branch(&root.id, BranchUpdate::new().with_body("v51"), &ada())
        .await
        .unwrap();
    assert_not_found(&manager.get_snapshot(&root.id, 1).await);
    assert!(manager.get_snapshot(&root.id, 51).await.is_ok());
}

#[tokio::test]
async fn test_rollback_is_a_new_version() {
    let manager = manager();
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "Original text."))
        .await
        .unwrap();
    manager
        .update_branch(&root.id, BranchUpdate::new().with_body("Rewritten."), &ada())
        .await
        .unwrap();

    let restored = manager.rollback_branch(&root.id, 1, &ada()).await.unwrap();
    assert_eq!(restored.version, 3);
    assert_eq!(restored.body, "Original text.");

    let reasons: Vec<_> = manager
        .list_versions(&root.id)
        .await
        .into_iter()
        .map(|v| (v.version, v.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (1, SnapshotReason::Mutation),
            (2, SnapshotReason::Mutation),
            (2, SnapshotReason::Rollback),
            (3, SnapshotReason::Mutation),
        ]
    );
}

#[tokio::test]
async fn test_tree_and_search() {
    let manager = manager();
    let root = manager
        .create_branch(
            NewBranch::new("ada", "Root", "Start.").with_hints(
                MetadataHints::new()
                    .genre("fantasy")
                    .tone("dark")
                    .tags(["dragons"]),
            ),
        )
        .await
        .unwrap();
    let child = manager
        .create_branch(
            NewBranch::new("bo", "Child", "Middle.")
                .with_parent(root.id)
                .with_hints(MetadataHints::new().tone("light").tags(["ships"])),
        )
        .await
        .unwrap();
    let grandchild = manager
        .create_branch(NewBranch::new("ada", "Grandchild", "End.").with_parent(child.id))
        .await
        .unwrap();
    manager.publish_branch(&child.id, &"bo".into()).await.unwrap();

    let tree: Vec<_> = manager
        .get_branch_tree(&root.id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(tree, vec![root.id, child.id, grandchild.id]);
    assert_not_found(&manager.get_branch_tree(&storyforge_core::BranchId::new()).await);

    let dark = manager
        .search_branches(&BranchFilter::new().genre("fantasy").tone("dark"))
        .await;
    assert_eq!(dark.len(), 1);
    assert_eq!(dark[0].id, root.id);

    let tagged = manager
        .search_branches(&BranchFilter::new().any_tag("ships").any_tag("dragons"))
        .await;
    assert_eq!(tagged.len(), 3);

    let published = manager
        .search_branches(&BranchFilter::new().published(true))
        .await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, child.id);

    let by_ada = manager
        .search_branches(&BranchFilter::new().author("ada").tone("light"))
        .await;
    assert_eq!(by_ada.len(), 1);
    assert_eq!(by_ada[0].id, grandchild.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_serialized() {
    let manager = Arc::new(manager());
    let root = manager
        .create_branch(NewBranch::new("ada", "Root", "Start."))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|n| {
            let manager = manager.clone();
            let id = root.id;
            tokio::spawn(async move {
                manager
                    .update_branch(
                        &id,
                        BranchUpdate::new().with_body(format!("Edit number {n}.")),
                        &AuthorId::new("ada"),
                    )
                    .await
                    .map(|b| b.version)
            })
        })
        .collect();

    let mut versions = Vec::new();
    for task in futures::future::join_all(tasks).await {
        versions.push(task.unwrap().unwrap());
    }
    versions.sort_unstable();

    assert_eq!(versions, (2..=21).collect::<Vec<u32>>());
    assert_eq!(manager.get_branch(&root.id).await.unwrap().version, 21);
    assert_eq!(manager.list_versions(&root.id).await.len(), 21);
}
