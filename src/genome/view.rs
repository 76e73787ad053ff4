use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::store::GenomeStore;
use super::types::{HistoryEntry, RequirementDocument, RequirementGenome, TaskStatus};
use crate::error::ExportError;

/// What the display layer should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSelection {
    /// Live status and genome
    Current,
    /// A specific history entry by position (not by round number)
    Round(usize),
}

/// Read-only projection of the store for one selection
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub selection: ViewSelection,
    /// Live status, populated for the `Current` selection
    pub status: Option<TaskStatus>,
    /// Archived entry, populated for a `Round` selection
    pub entry: Option<HistoryEntry>,
    /// Genome to display: the archived snapshot when the selected entry
    /// carries one, otherwise the live genome
    pub genome: RequirementGenome,
}

/// Chooses which round's data to display. Strictly read-only over the
/// store; selecting history never mutates anything.
pub struct ViewCoordinator {
    store: Arc<GenomeStore>,
    selection: ViewSelection,
}

impl ViewCoordinator {
    pub fn new(store: Arc<GenomeStore>) -> Self {
        Self {
            store,
            selection: ViewSelection::Current,
        }
    }

    pub fn select(&mut self, selection: ViewSelection) {
        self.selection = selection;
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshot_of(self.selection)
    }

    /// Project the store for an arbitrary selection. An out-of-range
    /// history position falls back to the current view.
    pub fn snapshot_of(&self, selection: ViewSelection) -> ViewSnapshot {
        if let ViewSelection::Round(index) = selection {
            if let Some(entry) = self.store.history().into_iter().nth(index) {
                let genome = entry
                    .resolution
                    .updated_state
                    .clone()
                    .unwrap_or_else(|| self.store.genome());
                return ViewSnapshot {
                    selection,
                    status: None,
                    entry: Some(entry),
                    genome,
                };
            }
        }

        ViewSnapshot {
            selection: ViewSelection::Current,
            status: self.store.status(),
            entry: None,
            genome: self.store.genome(),
        }
    }

    /// Write the current resolved document to `out_dir` as a JSON file
    /// named with today's date, e.g. `requirements_2026-08-29.json`.
    pub fn export_document(&self, out_dir: &Path) -> Result<PathBuf, ExportError> {
        let status = self.store.status().ok_or(ExportError::NoDocument)?;
        let document: RequirementDocument =
            status.document().cloned().ok_or(ExportError::NoDocument)?;

        let path = out_dir.join(format!("requirements_{}.json", Utc::now().format("%Y-%m-%d")));
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;

        info!("Exported requirement document to {:?}", path);
        Ok(path)
    }
}
