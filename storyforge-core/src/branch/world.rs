//! Dynamic world state carried by each branch.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// An ordered, id-keyed container for world entities.
///
/// Iteration order is the key order, so merges and prompts built from it are
/// reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap<V> {
    entries: BTreeMap<String, V>,
}

impl<V> Default for EntityMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> EntityMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`, returning the previous value.
    pub fn insert(&mut self, id: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(id.into(), value)
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut V> {
        self.entries.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<V> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, V> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, V> {
        self.entries.iter_mut()
    }
}

impl<V: Clone> EntityMap<V> {
    /// Add every entry of `other` whose id is not already present.
    ///
    /// Existing entries win on collision.
    pub fn union_keep_existing(&mut self, other: &EntityMap<V>) {
        for (id, value) in &other.entries {
            self.entries
                .entry(id.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl<'a, V> IntoIterator for &'a EntityMap<V> {
    type Item = (&'a String, &'a V);
    type IntoIter = btree_map::Iter<'a, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Physical model of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Physics {
    #[default]
    Realistic,
    Magical,
    SciFi,
    Surreal,
}

/// A rule the world obeys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldRule {
    pub id: String,
    pub description: String,
    /// physical, magical, social, economic or political.
    pub kind: String,
}

/// Global description of the story world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDescriptor {
    pub name: String,
    pub description: String,
    pub rules: Vec<WorldRule>,
    pub physics: Physics,
    /// 1-10.
    pub technology_level: u8,
    /// 0-10.
    pub magic_level: u8,
    /// 1-10.
    pub danger_level: u8,
    pub political_system: String,
    pub economic_system: String,
    pub cultural_notes: Vec<String>,
}

impl Default for WorldDescriptor {
    fn default() -> Self {
        Self {
            name: "New World".to_string(),
            description: "An undiscovered realm".to_string(),
            rules: Vec::new(),
            physics: Physics::Realistic,
            technology_level: 5,
            magic_level: 0,
            danger_level: 3,
            political_system: "unknown".to_string(),
            economic_system: "unknown".to_string(),
            cultural_notes: Vec::new(),
        }
    }
}

/// Life status of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStatus {
    #[default]
    Alive,
    Dead,
    Unknown,
    Transformed,
}

impl CharacterStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterStatus::Alive => "alive",
            CharacterStatus::Dead => "dead",
            CharacterStatus::Unknown => "unknown",
            CharacterStatus::Transformed => "transformed",
        }
    }
}

/// How one character relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Family,
    Friend,
    Lover,
    Rival,
    Enemy,
    Mentor,
    Student,
    Colleague,
    Stranger,
    Complicated,
}

/// A character in the story world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    /// Canonical name.
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub status: CharacterStatus,
    /// Other character id → relationship.
    pub relationships: BTreeMap<String, RelationshipKind>,
    pub traits: Vec<String>,
    pub location: Option<String>,
}

impl Character {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            status: CharacterStatus::Alive,
            relationships: BTreeMap::new(),
            traits: Vec::new(),
            location: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_status(mut self, status: CharacterStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_trait(mut self, description: impl Into<String>) -> Self {
        self.traits.push(description.into());
        self
    }

    pub fn with_relationship(mut self, other: impl Into<String>, kind: RelationshipKind) -> Self {
        self.relationships.insert(other.into(), kind);
        self
    }
}

/// A place in the story world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_location: Option<String>,
    pub atmosphere: String,
    pub danger_level: u8,
    pub notable_features: Vec<String>,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent_location: None,
            atmosphere: String::new(),
            danger_level: 0,
            notable_features: Vec::new(),
        }
    }
}

/// How much an event or decision matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Trivial,
    #[default]
    Minor,
    Moderate,
    Major,
    Critical,
}

/// Something that happened at a point in story time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    /// Story-time timestamp; only the ordering matters.
    pub timestamp: i64,
    pub description: String,
    pub participants: Vec<String>,
    pub location: Option<String>,
    pub importance: Importance,
}

impl TimelineEvent {
    pub fn new(id: impl Into<String>, timestamp: i64, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            description: description.into(),
            participants: Vec::new(),
            location: None,
            importance: Importance::default(),
        }
    }
}

/// An object that can be owned or found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: Option<String>,
    pub significance: Importance,
}

/// Value of a story switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// A choice made in the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub description: String,
    pub options: Vec<String>,
    pub chosen: Option<String>,
    pub timestamp: i64,
    pub importance: Importance,
}

/// The dynamic world state of a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub descriptor: WorldDescriptor,
    pub characters: EntityMap<Character>,
    pub locations: EntityMap<Location>,
    /// Kept sorted by timestamp.
    pub timeline: Vec<TimelineEvent>,
    pub inventory: EntityMap<Item>,
    pub flags: BTreeMap<String, FlagValue>,
    pub decisions: Vec<Decision>,
}

impl WorldState {
    /// Insert an event, keeping the timeline chronological.
    pub fn record_event(&mut self, event: TimelineEvent) {
        let at = self
            .timeline
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.timeline.insert(at, event);
    }

    /// Chronologically earliest event.
    pub fn first_event(&self) -> Option<&TimelineEvent> {
        self.timeline.iter().min_by_key(|e| e.timestamp)
    }

    /// Chronologically latest event.
    pub fn last_event(&self) -> Option<&TimelineEvent> {
        self.timeline.iter().max_by_key(|e| e.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_keeps_existing() {
        let mut target = EntityMap::new();
        target.insert("a", Location::new("a", "Harbor"));

        let mut source = EntityMap::new();
        source.insert("a", Location::new("a", "Old Harbor"));
        source.insert("b", Location::new("b", "Lighthouse"));

        target.union_keep_existing(&source);
        assert_eq!(target.len(), 2);
        assert_eq!(target.get("a").map(|l| l.name.as_str()), Some("Harbor"));
        assert!(target.contains("b"));
    }

    #[test]
    fn test_record_event_keeps_order() {
        let mut world = WorldState::default();
        world.record_event(TimelineEvent::new("late", 30, "storm"));
        world.record_event(TimelineEvent::new("early", 10, "calm"));
        world.record_event(TimelineEvent::new("mid", 20, "wind"));

        let order: Vec<_> = world.timeline.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
        assert_eq!(world.first_event().map(|e| e.timestamp), Some(10));
        assert_eq!(world.last_event().map(|e| e.timestamp), Some(30));
    }

    #[test]
    fn test_flag_values_serialize_untagged() {
        let mut world = WorldState::default();
        world.flags.insert("gate".into(), FlagValue::Bool(true));
        world.flags.insert("gold".into(), FlagValue::Number(12.0));

        let json = serde_json::to_value(&world.flags).unwrap();
        assert_eq!(json["gate"], true);
        assert_eq!(json["gold"], 12.0);
    }
}
