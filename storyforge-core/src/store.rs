//! In-memory branch store with a per-author index.

use crate::branch::{AuthorId, Branch, BranchId};
use crate::error::{StoryError, StoryResult};
use std::collections::{HashMap, HashSet, VecDeque};

/// Conjunctive search filter. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct BranchFilter {
    pub genre: Option<String>,
    pub tone: Option<String>,
    /// Matches when the branch carries any of these tags.
    pub tags: Vec<String>,
    pub author: Option<AuthorId>,
    pub published: Option<bool>,
    /// Logically deleted branches are skipped unless this is set.
    pub include_deleted: bool,
}

impl BranchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn any_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn author(mut self, author: impl Into<AuthorId>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn published(mut self, published: bool) -> Self {
        self.published = Some(published);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Whether `branch` satisfies every set criterion.
    pub fn matches(&self, branch: &Branch) -> bool {
        if !self.include_deleted && branch.is_deleted() {
            return false;
        }
        if let Some(ref genre) = self.genre {
            if &branch.metadata.genre != genre {
                return false;
            }
        }
        if let Some(ref tone) = self.tone {
            if &branch.metadata.tone != tone {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| branch.metadata.tags.contains(t)) {
            return false;
        }
        if let Some(ref author) = self.author {
            if &branch.author_id != author {
                return false;
            }
        }
        if let Some(published) = self.published {
            if branch.is_published != published {
                return false;
            }
        }
        true
    }
}

/// Authoritative map of branch id to branch record.
///
/// The store owns every branch's `children` list. Callers hand in whole
/// records; child links are only ever appended by [`BranchStore::insert`].
#[derive(Debug, Default)]
pub struct BranchStore {
    branches: HashMap<BranchId, Branch>,
    /// Author → branch ids in insertion order.
    by_author: HashMap<AuthorId, Vec<BranchId>>,
}

impl BranchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly created branch and link it under its parent.
    ///
    /// Fails with `NotFound` if the branch names a parent that is not stored.
    /// Nothing is written in that case.
    pub fn insert(&mut self, branch: Branch) -> StoryResult<()> {
        if let Some(parent_id) = branch.parent_id {
            if parent_id == branch.id {
                return Err(StoryError::ValidationFailed(format!(
                    "Branch {} cannot be its own parent",
                    branch.id
                )));
            }
            let parent = self
                .branches
                .get_mut(&parent_id)
                .ok_or_else(|| StoryError::branch_not_found(parent_id))?;
            if !parent.children.contains(&branch.id) {
                parent.children.push(branch.id);
            }
        }
        self.index_author(&branch);
        self.branches.insert(branch.id, branch);
        Ok(())
    }

    /// Insert a record loaded from elsewhere without touching any parent.
    ///
    /// Used when hydrating from a repository or an archive, where the child
    /// lists were persisted along with each record.
    pub fn cache(&mut self, branch: Branch) {
        if !branch.is_deleted() {
            self.index_author(&branch);
        }
        self.branches.insert(branch.id, branch);
    }

    /// Swap in a new state for an existing branch.
    ///
    /// The stored child list is kept, so a child appended concurrently is never
    /// lost to a stale copy.
    pub fn replace(&mut self, mut branch: Branch) -> StoryResult<()> {
        let current = self
            .branches
            .get_mut(&branch.id)
            .ok_or_else(|| StoryError::branch_not_found(branch.id))?;
        branch.children = std::mem::take(&mut current.children);
        *current = branch;
        Ok(())
    }

    pub fn get(&self, id: &BranchId) -> Option<&Branch> {
        self.branches.get(id)
    }

    pub fn contains(&self, id: &BranchId) -> bool {
        self.branches.contains_key(id)
    }

    /// Live branches for an author, in insertion order.
    pub fn by_author(&self, author: &AuthorId) -> Vec<&Branch> {
        self.by_author
            .get(author)
            .map(|ids| ids.iter().filter_map(|id| self.branches.get(id)).collect())
            .unwrap_or_default()
    }

    /// Drop a branch from its author's index. The record itself stays.
    pub fn remove_from_author_index(&mut self, id: &BranchId) {
        let Some(author) = self.branches.get(id).map(|b| b.author_id.clone()) else {
            return;
        };
        if let Some(ids) = self.by_author.get_mut(&author) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.by_author.remove(&author);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    /// Breadth-first walk from `root` over child links.
    ///
    /// Each id is visited at most once and the walk stops after `len()`
    /// records, so cycles, self-references and dangling ids cannot stall it.
    /// Returns an empty list if `root` is not stored.
    pub fn tree(&self, root: &BranchId) -> Vec<Branch> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*root]);

        while let Some(id) = queue.pop_front() {
            if out.len() >= self.branches.len() {
                break;
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(branch) = self.branches.get(&id) else {
                continue;
            };
            for child in &branch.children {
                if !visited.contains(child) {
                    queue.push_back(*child);
                }
            }
            out.push(branch.clone());
        }

        out
    }

    /// Branches matching `filter`, oldest first.
    pub fn search(&self, filter: &BranchFilter) -> Vec<Branch> {
        let mut found: Vec<Branch> = self
            .branches
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }

    fn index_author(&mut self, branch: &Branch) {
        let ids = self.by_author.entry(branch.author_id.clone()).or_default();
        if !ids.contains(&branch.id) {
            ids.push(branch.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{ContinuityState, MetadataHints, WorldState, DELETED_TAG};

    fn branch(author: &str, parent: Option<BranchId>) -> Branch {
        Branch::assemble(
            AuthorId::new(author),
            "Title",
            "Some words here.",
            &MetadataHints::default(),
            parent,
            WorldState::default(),
            ContinuityState::default(),
            200,
        )
    }

    #[test]
    fn test_insert_links_parent() {
        let mut store = BranchStore::new();
        let root = branch("ada", None);
        let root_id = root.id;
        store.insert(root).unwrap();

        let child = branch("ada", Some(root_id));
        let child_id = child.id;
        store.insert(child).unwrap();

        assert_eq!(store.get(&root_id).unwrap().children, vec![child_id]);
        assert_eq!(store.by_author(&AuthorId::new("ada")).len(), 2);
    }

    #[test]
    fn test_insert_missing_parent_writes_nothing() {
        let mut store = BranchStore::new();
        let orphan = branch("ada", Some(BranchId::new()));
        let err = store.insert(orphan).unwrap_err();
        assert!(err.is_not_found());
        assert!(store.is_empty());
        assert!(store.by_author(&AuthorId::new("ada")).is_empty());
    }

    #[test]
    fn test_replace_keeps_children() {
        let mut store = BranchStore::new();
        let root = branch("ada", None);
        let root_id = root.id;
        store.insert(root).unwrap();

        let stale = store.get(&root_id).unwrap().clone();
        store.insert(branch("bo", Some(root_id))).unwrap();

        let mut edited = stale;
        edited.title = "Edited".to_string();
        store.replace(edited).unwrap();

        let stored = store.get(&root_id).unwrap();
        assert_eq!(stored.title, "Edited");
        assert_eq!(stored.children.len(), 1);
    }

    #[test]
    fn test_tree_survives_self_reference() {
        let mut store = BranchStore::new();
        let mut root = branch("ada", None);
        let root_id = root.id;
        root.children.push(root_id);
        root.children.push(BranchId::new());
        store.cache(root);

        let child = branch("ada", Some(root_id));
        store.insert(child).unwrap();

        let tree = store.tree(&root_id);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, root_id);
        assert!(store.tree(&BranchId::new()).is_empty());
    }

    #[test]
    fn test_search_is_conjunctive() {
        let mut store = BranchStore::new();

        let mut noir = branch("ada", None);
        noir.metadata.genre = "noir".to_string();
        noir.metadata.tags = vec!["rain".to_string()];
        noir.is_published = true;
        store.insert(noir).unwrap();

        let mut other = branch("bo", None);
        other.metadata.genre = "noir".to_string();
        store.insert(other).unwrap();

        let mut gone = branch("ada", None);
        gone.metadata.genre = "noir".to_string();
        gone.metadata.tags.push(DELETED_TAG.to_string());
        store.insert(gone).unwrap();

        assert_eq!(store.search(&BranchFilter::new().genre("noir")).len(), 2);
        assert_eq!(
            store
                .search(&BranchFilter::new().genre("noir").any_tag("rain").any_tag("fog"))
                .len(),
            1
        );
        assert_eq!(
            store
                .search(&BranchFilter::new().author("ada").published(true))
                .len(),
            1
        );
        assert_eq!(
            store
                .search(&BranchFilter::new().genre("noir").include_deleted())
                .len(),
            3
        );
    }

    #[test]
    fn test_remove_from_author_index() {
        let mut store = BranchStore::new();
        let root = branch("ada", None);
        let id = root.id;
        store.insert(root).unwrap();

        store.remove_from_author_index(&id);
        assert!(store.by_author(&AuthorId::new("ada")).is_empty());
        assert!(store.contains(&id));
    }
}
