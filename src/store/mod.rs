use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use thiserror::Error;

use crate::entry::EntryData;
use crate::event::AlarmEvent;

mod model;
pub use model::StoredEvent;

use model::{StoredEntry, StoredGroup};

const ENTRIES_TREE: &str = "entries";
const GROUPS_TREE: &str = "groups";
const EVENTS_TREE: &str = "events";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store database error: {0}")]
    Db(#[from] sled::Error),
    #[error("corrupt record in '{tree}' tree: {source}")]
    Decode {
        tree: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to encode record for '{tree}' tree: {source}")]
    Encode {
        tree: &'static str,
        source: serde_json::Error,
    },
    #[error("group '{0}' not found")]
    GroupMissing(String),
}

/// Embedded store holding monitored-point configuration (`entries`,
/// `groups`) and the archive of dispatched events.
#[derive(Clone)]
pub struct Store {
    entries: sled::Tree,
    groups: sled::Tree,
    events: sled::Tree,
    sequence: Arc<AtomicU32>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            entries: db.open_tree(ENTRIES_TREE)?,
            groups: db.open_tree(GROUPS_TREE)?,
            events: db.open_tree(EVENTS_TREE)?,
            sequence: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn get_entries(&self) -> Result<Vec<EntryData>, StoreError> {
        let mut entries = Vec::new();
        for item in self.entries.iter() {
            let (_, value) = item?;
            let stored: StoredEntry = serde_json::from_slice(&value).map_err(|source| {
                StoreError::Decode {
                    tree: ENTRIES_TREE,
                    source,
                }
            })?;
            entries.push(stored.into_data());
        }
        Ok(entries)
    }

    pub fn get_group(&self, name: &str) -> Result<GroupData, StoreError> {
        let value = self
            .groups
            .get(name.as_bytes())?
            .ok_or_else(|| StoreError::GroupMissing(name.to_string()))?;
        let stored: StoredGroup =
            serde_json::from_slice(&value).map_err(|source| StoreError::Decode {
                tree: GROUPS_TREE,
                source,
            })?;
        Ok(GroupData {
            id: stored.id,
            name: stored.name,
            enabled: stored.enabled,
            description: stored.description,
        })
    }

    /// Archive one dispatched event. Keys order by dispatch time with a
    /// process-local sequence as tie-breaker.
    pub fn persist_event(&self, event: &AlarmEvent) -> Result<(), StoreError> {
        let mut key = Vec::with_capacity(12);
        key.extend_from_slice(&event.timestamp.utc().timestamp_millis().to_be_bytes());
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        key.extend_from_slice(&seq.to_be_bytes());

        let payload = StoredEvent::from_event(event);
        let value = serde_json::to_vec(&payload).map_err(|source| StoreError::Encode {
            tree: EVENTS_TREE,
            source,
        })?;
        self.events.insert(key, value)?;
        Ok(())
    }

    /// Archived events in dispatch order. Decode failures are skipped; the
    /// archive is diagnostic data, not a source of truth.
    pub fn archived_events(&self) -> Vec<StoredEvent> {
        self.events
            .iter()
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice::<StoredEvent>(&value).ok())
            .collect()
    }

    pub fn insert_entry(&self, data: &EntryData) -> Result<(), StoreError> {
        let stored = StoredEntry::from_data(data);
        let value = serde_json::to_vec(&stored).map_err(|source| StoreError::Encode {
            tree: ENTRIES_TREE,
            source,
        })?;
        self.entries.insert(data.id.as_bytes(), value)?;
        Ok(())
    }

    pub fn insert_group(&self, data: &GroupData) -> Result<(), StoreError> {
        let stored = StoredGroup {
            id: data.id.clone(),
            name: data.name.clone(),
            enabled: data.enabled,
            description: data.description.clone(),
        };
        let value = serde_json::to_vec(&stored).map_err(|source| StoreError::Encode {
            tree: GROUPS_TREE,
            source,
        })?;
        self.groups.insert(data.name.as_bytes(), value)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupData {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub description: String,
}
