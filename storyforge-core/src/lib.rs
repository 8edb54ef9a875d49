//! Branching narrative store.
//!
//! This crate provides:
//! - A forest of versioned story branches with deep-copied world state
//! - Continuity validation of a branch against its parent
//! - Manual, auto and smart merges
//! - Bounded per-branch version history
//! - AI-assisted continuation through a pluggable generator (Claude by default)
//!
//! # Quick Start
//!
//! ```ignore
//! use storyforge_core::{BranchManager, BranchStore, NewBranch, StoryForgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = BranchManager::new(BranchStore::new(), StoryForgeConfig::default());
//!
//!     let root = manager
//!         .create_branch(NewBranch::new("ada", "The Harbor", "Fog rolled in."))
//!         .await?;
//!     let child = manager
//!         .create_branch(NewBranch::new("bo", "The Bell", "A bell rang.").with_parent(root.id))
//!         .await?;
//!
//!     println!("{} -> {}", root.title, child.title);
//!     Ok(())
//! }
//! ```

pub mod branch;
pub mod config;
pub mod continuity;
pub mod error;
pub mod manager;
pub mod merge;
pub mod narrative;
pub mod persist;
pub mod store;
pub mod testing;
pub mod versions;

// Primary public API
pub use branch::{AuthorId, Branch, BranchId, BranchUpdate, MetadataHints};
pub use config::{ConfigError, StoryForgeConfig};
pub use continuity::{ContinuityEngine, ValidationReport};
pub use error::{StoryError, StoryResult};
pub use manager::{BranchManager, NewBranch};
pub use merge::MergeStrategy;
pub use narrative::{
    ClaudeGenerator, ContinuationMode, GenerationError, GenerationOptions, NarrativeGenerator,
    NarrativeOrchestrator,
};
pub use persist::{
    BranchRepository, InMemoryRepository, JsonDirectoryRepository, PersistError, StoryArchive,
};
pub use store::{BranchFilter, BranchStore};
pub use testing::{ScriptedGenerator, StoryHarness, UnavailableRepository};
pub use versions::{Snapshot, VersionControl, VersionInfo};
