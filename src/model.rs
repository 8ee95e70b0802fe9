//! # Data Model
//!
//! Core types for the counter matrix: dense entity/metric identifiers,
//! metric keys, leaderboard rows, and the store error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Compact identifier for entities, assigned densely in first-seen order.
///
/// Once assigned, an entity id is stable for the lifetime of the store and
/// is never reused or reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Compact identifier for metric keys, assigned densely in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricId(pub u32);

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// A metric key in `category/name` form, e.g. `mined/minecraft:diamond_ore`.
///
/// The key string is what the registry interns; the category/name split only
/// exists at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey(String);

impl MetricKey {
    /// Build a key from a category and a name.
    pub fn new(category: &str, name: &str) -> Self {
        Self(format!("{category}/{name}"))
    }

    /// Wrap an already-joined `category/name` string.
    pub fn from_full(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One leaderboard row: an entity and its counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub entity: Uuid,
    pub value: i32,
}

/// One external per-entity record source, as enumerated by a source lister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Stable identifier of the source, e.g. its file name.
    pub name: String,
    /// Entity whose counters the source carries.
    pub entity: Uuid,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: i64,
}

/// Error taxonomy for the store.
///
/// Lookups of identifiers or keys that were never assigned are not errors:
/// they read as 0 or an empty result.
#[derive(Debug)]
pub enum StoreError {
    /// The dense entity id space is full; the offending entity was not
    /// assigned an id and nothing was persisted.
    CapacityExceeded { limit: u32 },
    /// A single external record source is malformed.
    SourceParse { source: String, detail: String },
    /// Failure to create, grow, or map backing storage.
    Storage(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::CapacityExceeded { limit } => {
                write!(f, "entity id space full ({limit} entities)")
            }
            StoreError::SourceParse { source, detail } => {
                write!(f, "malformed record source {source}: {detail}")
            }
            StoreError::Storage(err) => write!(f, "storage I/O failure: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err)
    }
}
