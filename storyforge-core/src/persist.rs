//! Branch persistence.
//!
//! The manager keeps every branch in memory and writes through to a
//! [`BranchRepository`]. Two repositories ship here: an in-memory one for
//! tests and embedding, and a directory of versioned JSON files.

use crate::branch::{AuthorId, Branch, BranchId};
use crate::versions::Snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save format")]
    InvalidFormat,

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Current branch file version.
const SAVE_VERSION: u32 = 1;

/// Current archive file version.
const ARCHIVE_VERSION: u32 = 1;

/// Durable storage for branches.
#[async_trait]
pub trait BranchRepository: Send + Sync {
    /// Insert or overwrite a branch.
    async fn save(&self, branch: &Branch) -> Result<(), PersistError>;

    /// Load a branch, `None` if it was never saved.
    async fn load(&self, id: &BranchId) -> Result<Option<Branch>, PersistError>;

    /// Every stored branch written by `author`, deleted ones included.
    async fn list_by_author(&self, author: &AuthorId) -> Result<Vec<Branch>, PersistError>;

    /// Remove a branch. Removing a missing branch is not an error.
    async fn delete(&self, id: &BranchId) -> Result<(), PersistError>;
}

/// Repository that keeps branches in a map.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    branches: RwLock<HashMap<BranchId, Branch>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.branches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.branches.read().await.is_empty()
    }
}

#[async_trait]
impl BranchRepository for InMemoryRepository {
    async fn save(&self, branch: &Branch) -> Result<(), PersistError> {
        self.branches
            .write()
            .await
            .insert(branch.id, branch.clone());
        Ok(())
    }

    async fn load(&self, id: &BranchId) -> Result<Option<Branch>, PersistError> {
        Ok(self.branches.read().await.get(id).cloned())
    }

    async fn list_by_author(&self, author: &AuthorId) -> Result<Vec<Branch>, PersistError> {
        let mut found: Vec<Branch> = self
            .branches
            .read()
            .await
            .values()
            .filter(|b| &b.author_id == author)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete(&self, id: &BranchId) -> Result<(), PersistError> {
        self.branches.write().await.remove(id);
        Ok(())
    }
}

/// A branch as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedBranch {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the file was written.
    pub saved_at: DateTime<Utc>,

    pub branch: Branch,
}

impl SavedBranch {
    pub fn new(branch: Branch) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            branch,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

/// Repository storing one `<uuid>.json` file per branch.
#[derive(Debug, Clone)]
pub struct JsonDirectoryRepository {
    dir: PathBuf,
}

impl JsonDirectoryRepository {
    /// Use `dir`, creating it if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &BranchId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_uuid()))
    }
}

#[async_trait]
impl BranchRepository for JsonDirectoryRepository {
    async fn save(&self, branch: &Branch) -> Result<(), PersistError> {
        SavedBranch::new(branch.clone())
            .save_json(self.path_for(&branch.id))
            .await
    }

    async fn load(&self, id: &BranchId) -> Result<Option<Branch>, PersistError> {
        let path = self.path_for(id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let saved = SavedBranch::load_json(&path).await?;
        if saved.branch.id != *id {
            return Err(PersistError::InvalidFormat);
        }
        Ok(Some(saved.branch))
    }

    async fn list_by_author(&self, author: &AuthorId) -> Result<Vec<Branch>, PersistError> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let saved = SavedBranch::load_json(&path).await?;
                if &saved.branch.author_id == author {
                    found.push(saved.branch);
                }
            }
        }

        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete(&self, id: &BranchId) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Every branch and retained snapshot, exported as one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryArchive {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub branches: Vec<Branch>,
    pub snapshots: Vec<Snapshot>,
}

impl StoryArchive {
    pub fn new(branches: Vec<Branch>, snapshots: Vec<Snapshot>) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            exported_at: Utc::now(),
            branches,
            snapshots,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let archive: Self = serde_json::from_str(&content)?;

        if archive.version != ARCHIVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: ARCHIVE_VERSION,
                found: archive.version,
            });
        }

        Ok(archive)
    }
}
