//! # Identifier Registries
//!
//! Dense integer ids for entity identifiers and metric keys, plus the
//! best-effort display-name cache. Ids are assigned sequentially on first
//! sight and never reused; every assignment is appended to its registry's
//! log file inside the same critical section that updates the in-memory
//! map, so memory and disk cannot diverge observably.

use crate::model::{EntityId, MetricId, StoreError};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const ENTITY_LOG: &str = "players.map";
const METRIC_LOG: &str = "stats.map";
const NAME_FILE: &str = "names.map";

struct RegistryInner {
    entity_ids: HashMap<uuid::Uuid, EntityId>,
    /// Dense id -> identifier; index is the entity id.
    entities: Vec<uuid::Uuid>,
    metric_ids: HashMap<String, MetricId>,
    metric_count: u32,
    entity_log: File,
    metric_log: File,
}

/// Registry assigning dense ids to entity identifiers and metric keys.
///
/// Both creation paths share one mutual-exclusion domain, so concurrent
/// calls for the same identifier can never assign it two ids.
pub struct IdRegistry {
    inner: RwLock<RegistryInner>,
    max_entities: u32,
}

impl IdRegistry {
    /// Load both registries from their log files in `dir`, creating empty
    /// logs on first open.
    pub fn open(dir: &Path, max_entities: u32) -> Result<Self, StoreError> {
        let entity_path = dir.join(ENTITY_LOG);
        let metric_path = dir.join(METRIC_LOG);

        let mut entity_ids = HashMap::new();
        let mut entities = Vec::new();
        for line in read_lines(&entity_path)? {
            match line.parse::<uuid::Uuid>() {
                Ok(id) => {
                    entity_ids.insert(id, EntityId(entities.len() as u32));
                    entities.push(id);
                }
                Err(_) => warn!(%line, "skipping malformed entity identifier"),
            }
        }

        let mut metric_ids = HashMap::new();
        let mut metric_count = 0u32;
        for line in read_lines(&metric_path)? {
            metric_ids.insert(line, MetricId(metric_count));
            metric_count += 1;
        }

        let entity_log = append_handle(&entity_path)?;
        let metric_log = append_handle(&metric_path)?;
        Ok(Self {
            inner: RwLock::new(RegistryInner {
                entity_ids,
                entities,
                metric_ids,
                metric_count,
                entity_log,
                metric_log,
            }),
            max_entities,
        })
    }

    /// Return the entity's dense id, assigning the next one on first sight.
    ///
    /// Fails with `CapacityExceeded` once the id space is full; nothing is
    /// persisted for the rejected identifier.
    pub fn get_or_create_entity(&self, entity: uuid::Uuid) -> Result<EntityId, StoreError> {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.entity_ids.get(&entity) {
            return Ok(id);
        }
        if inner.entities.len() as u32 >= self.max_entities {
            return Err(StoreError::CapacityExceeded {
                limit: self.max_entities,
            });
        }
        // Log first: a failed append leaves neither memory nor disk changed.
        writeln!(inner.entity_log, "{entity}")?;
        let id = EntityId(inner.entities.len() as u32);
        inner.entity_ids.insert(entity, id);
        inner.entities.push(entity);
        Ok(id)
    }

    /// Return the metric key's dense id, assigning the next one on first
    /// sight.
    pub fn get_or_create_metric(&self, key: &str) -> Result<MetricId, StoreError> {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.metric_ids.get(key) {
            return Ok(id);
        }
        writeln!(inner.metric_log, "{key}")?;
        let id = MetricId(inner.metric_count);
        inner.metric_count += 1;
        inner.metric_ids.insert(key.to_string(), id);
        Ok(id)
    }

    pub fn entity_id(&self, entity: uuid::Uuid) -> Option<EntityId> {
        self.inner.read().entity_ids.get(&entity).copied()
    }

    pub fn metric_id(&self, key: &str) -> Option<MetricId> {
        self.inner.read().metric_ids.get(key).copied()
    }

    /// Identifier behind a dense id, if that id was ever assigned.
    pub fn entity_at(&self, id: EntityId) -> Option<uuid::Uuid> {
        self.inner.read().entities.get(id.0 as usize).copied()
    }

    pub fn entity_count(&self) -> u32 {
        self.inner.read().entities.len() as u32
    }

    pub fn metric_count(&self) -> u32 {
        self.inner.read().metric_count
    }
}

struct NameInner {
    names: HashMap<uuid::Uuid, String>,
    path: PathBuf,
}

/// Last-known display name per entity identifier.
///
/// Non-authoritative: whatever name was observed most recently wins. The
/// backing file is rewritten whole on every change.
pub struct NameCache {
    inner: Mutex<NameInner>,
}

impl NameCache {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(NAME_FILE);
        let mut names = HashMap::new();
        for line in read_lines(&path)? {
            let Some((id, name)) = line.split_once(':') else {
                continue;
            };
            match id.parse::<uuid::Uuid>() {
                Ok(id) => {
                    names.insert(id, name.to_string());
                }
                Err(_) => warn!(%line, "skipping malformed name cache entry"),
            }
        }
        Ok(Self {
            inner: Mutex::new(NameInner { names, path }),
        })
    }

    /// Record the latest observed name; a no-op when it is unchanged.
    pub fn cache_name(&self, entity: uuid::Uuid, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.names.get(&entity).map(String::as_str) == Some(name) {
            return Ok(());
        }
        inner.names.insert(entity, name.to_string());
        let mut file = File::create(&inner.path)?;
        for (id, name) in &inner.names {
            writeln!(file, "{id}:{name}")?;
        }
        Ok(())
    }

    pub fn name_of(&self, entity: uuid::Uuid) -> Option<String> {
        self.inner.lock().names.get(&entity).cloned()
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn append_handle(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new().append(true).create(true).open(path)?)
}
