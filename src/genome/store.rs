use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::types::{HistoryEntry, RequirementGenome, TaskStatus};

const GENOME_KEY: &str = "requirement_genome";
const HISTORY_KEY: &str = "requirement_history";
const STATUS_KEY: &str = "requirement_status";

/// Single source of truth for the live genome, the append-only round
/// history, and the last observed task status.
///
/// Every mutation is followed by a full re-serialization of the affected
/// slices to the state directory. Serialization failures are logged and
/// swallowed (best-effort durability), never surfaced to callers.
pub struct GenomeStore {
    state_dir: PathBuf,
    genome: Mutex<RequirementGenome>,
    history: Mutex<Vec<HistoryEntry>>,
    status: Mutex<Option<TaskStatus>>,
}

impl GenomeStore {
    /// Open a store rooted at `state_dir`, rehydrating any persisted state.
    ///
    /// Missing or corrupt entries load as the respective type's default —
    /// never a fatal error.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create state directory: {:?}", state_dir))?;

        let genome: RequirementGenome = load_or_default(&state_dir, GENOME_KEY);
        let history: Vec<HistoryEntry> = load_or_default(&state_dir, HISTORY_KEY);
        let status: Option<TaskStatus> = load_or_default(&state_dir, STATUS_KEY);

        info!(
            "Genome store opened: round {}, {} history entries",
            genome.round,
            history.len()
        );

        Ok(Self {
            state_dir,
            genome: Mutex::new(genome),
            history: Mutex::new(history),
            status: Mutex::new(status),
        })
    }

    /// Append a resolved round to history and, when it carries an
    /// `updated_state`, replace the live genome wholesale.
    pub fn apply_resolution(&self, entry: HistoryEntry) {
        if let Some(state) = entry.resolution.updated_state.clone() {
            let mut genome = lock(&self.genome);
            *genome = state;
            self.persist(GENOME_KEY, &*genome);
        }

        let mut history = lock(&self.history);
        history.push(entry);
        self.persist(HISTORY_KEY, &*history);
    }

    /// Overwrite (not merge) the last observed task status
    pub fn set_status(&self, status: Option<TaskStatus>) {
        let mut slot = lock(&self.status);
        *slot = status;
        self.persist(STATUS_KEY, &*slot);
    }

    pub fn genome(&self) -> RequirementGenome {
        lock(&self.genome).clone()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).clone()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn status(&self) -> Option<TaskStatus> {
        lock(&self.status).clone()
    }

    /// Current round of the live genome
    pub fn round(&self) -> u32 {
        lock(&self.genome).round
    }

    /// Destroy all state: zero genome, empty history, no status, and no
    /// persisted copies. Irreversible.
    pub fn reset(&self) {
        *lock(&self.genome) = RequirementGenome::default();
        lock(&self.history).clear();
        *lock(&self.status) = None;

        for key in [GENOME_KEY, HISTORY_KEY, STATUS_KEY] {
            let path = entry_path(&self.state_dir, key);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }

        info!("Genome store reset");
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let path = entry_path(&self.state_dir, key);
        let json = match serde_json::to_string_pretty(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = fs::write(&path, json) {
            warn!("Failed to persist {} to {:?}: {}", key, path, e);
        }
    }
}

fn entry_path(state_dir: &Path, key: &str) -> PathBuf {
    state_dir.join(format!("{}.json", key))
}

fn load_or_default<T: DeserializeOwned + Default>(state_dir: &Path, key: &str) -> T {
    let path = entry_path(state_dir, key);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            debug!("No persisted {} found, using default", key);
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Corrupt persisted {} ({}), using default", key, e);
            T::default()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
