use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, SyncError};

/// Default number of message ids remembered across runs
pub const DEFAULT_MAX_TRACKED_IDS: usize = 1000;

/// On-disk shape of the processed-set file
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    processed_ids: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::models::deserializers::deserialize_lenient_timestamp"
    )]
    last_run: Option<DateTime<Utc>>,
}

/// Bounded record of message ids already appended to the sheet
///
/// Ids are kept in insertion order so the oldest can be evicted once the
/// capacity is reached; a `HashSet` beside the queue gives constant-time
/// membership checks.
#[derive(Debug, Clone)]
pub struct ProcessedSet {
    ids: VecDeque<String>,
    index: HashSet<String>,
    last_run: Option<DateTime<Utc>>,
    capacity: usize,
}

impl ProcessedSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_TRACKED_IDS)),
            index: HashSet::new(),
            last_run: None,
            capacity,
        }
    }

    /// Load state from disk
    ///
    /// A missing file starts fresh. A file that cannot be read or parsed is
    /// reported and replaced by an empty set; it is never fatal.
    pub async fn load(path: &Path, capacity: usize) -> Self {
        if !path.exists() {
            tracing::info!("No existing state file found at {:?}, starting fresh", path);
            return Self::new(capacity);
        }

        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Could not read state file {:?}: {}. Starting fresh", path, e);
                return Self::new(capacity);
            }
        };

        match serde_json::from_str::<PersistedState>(&json) {
            Ok(persisted) => {
                let state = Self::from_persisted(persisted, capacity);
                tracing::info!(
                    "Loaded processed state: {} ids, last_run={:?}",
                    state.len(),
                    state.last_run
                );
                state
            }
            Err(e) => {
                tracing::warn!(
                    "State file {:?} is corrupt ({}). Starting with an empty processed set",
                    path,
                    e
                );
                Self::new(capacity)
            }
        }
    }

    fn from_persisted(persisted: PersistedState, capacity: usize) -> Self {
        let mut state = Self::new(capacity);
        for id in persisted.processed_ids {
            state.mark_processed(&id);
        }
        state.last_run = persisted.last_run;
        state
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Record an id, evicting the oldest entries beyond capacity
    ///
    /// Returns false when the id was already present; its position is unchanged.
    pub fn mark_processed(&mut self, id: &str) -> bool {
        if self.index.contains(id) {
            return false;
        }
        self.ids.push_back(id.to_string());
        self.index.insert(id.to_string());

        while self.ids.len() > self.capacity {
            if let Some(evicted) = self.ids.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    pub fn update_last_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tracked ids, oldest first
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Save state to disk, replacing the previous file atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let persisted = PersistedState {
            processed_ids: self.ids.iter().cloned().collect(),
            last_run: self.last_run,
        };
        let json = serde_json::to_string_pretty(&persisted)?;

        let tmp_path = temp_path_for(path)?;
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Saved {} processed ids to {:?}", self.len(), path);
        Ok(())
    }
}

impl Default for ProcessedSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED_IDS)
    }
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| SyncError::StateError(format!("Invalid state file path: {:?}", path)))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}
