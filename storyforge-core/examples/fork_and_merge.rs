//! Fork a story, kill a character on one side and merge it back.
//!
//! Run with: cargo run -p storyforge-core --example fork_and_merge
//! (Set ANTHROPIC_API_KEY in .env to continue the merged story with Claude.
//! Use RUST_LOG=storyforge_core=debug to see validation events.)

use std::sync::Arc;
use storyforge_core::branch::{Character, CharacterStatus, WorldState};
use storyforge_core::narrative::{ContinuationMode, GenerationOptions, LengthTier};
use storyforge_core::{
    AuthorId, BranchManager, BranchStore, ClaudeGenerator, MergeStrategy, NarrativeGenerator,
    NewBranch, ScriptedGenerator, StoryForgeConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (try workspace root first, then current dir)
    if dotenvy::from_path("../.env").is_err() {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = StoryForgeConfig::from_env()?.with_max_tokens(400);

    let generator: Arc<dyn NarrativeGenerator> = match ClaudeGenerator::from_env() {
        Ok(claude) => match config.model.clone() {
            Some(model) => Arc::new(claude.with_model(model)),
            None => Arc::new(claude),
        },
        Err(e) => {
            eprintln!("Claude unavailable ({e}), using a scripted generator");
            Arc::new(ScriptedGenerator::new().reply("Years later, the keeper's lamp still burned."))
        }
    };

    let manager = BranchManager::new(BranchStore::new(), config).with_generator(generator);
    let ada = AuthorId::new("ada");

    let mut world = WorldState::default();
    world.characters.insert(
        "keeper",
        Character::new("keeper", "Ines").with_alias("the keeper"),
    );

    let root = manager
        .create_branch(
            NewBranch::new("ada", "The Lighthouse", "Ines climbed the stairs as the storm rose.")
                .with_world(world.clone()),
        )
        .await?;

    let mut lost = world.clone();
    if let Some(keeper) = lost.characters.get_mut("keeper") {
        keeper.status = CharacterStatus::Dead;
    }
    let storm = manager
        .create_branch(
            NewBranch::new("ada", "The Wave", "The wave took the gallery and Ines with it.")
                .with_parent(root.id)
                .with_world(lost),
        )
        .await?;
    let calm = manager
        .create_branch(
            NewBranch::new("ada", "The Calm", "By dawn the storm had passed. Ines slept.")
                .with_parent(root.id),
        )
        .await?;

    let merged = manager
        .merge_branches(&storm.id, &calm.id, &ada, MergeStrategy::Smart)
        .await?;

    println!("Merged branch: {} (score {})", merged.title, merged.consistency_score());
    for character in merged.world.characters.values() {
        println!("  {} is {}", character.name, character.status.name());
    }

    let options = GenerationOptions::new().with_length(LengthTier::Micro);
    let continued = manager
        .continue_branch(&merged.id, &ada, ContinuationMode::Continue, options)
        .await?;
    println!("\n{}\n", continued.body);

    for branch in manager.get_branch_tree(&root.id).await? {
        println!("{} v{} {}", branch.id, branch.version, branch.title);
    }

    Ok(())
}
