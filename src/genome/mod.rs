//! Requirement genome: domain types, the durable store, and read-only
//! view projections.
//!
//! The store is the single source of truth for the live genome, the
//! append-only round history, and the last observed task status. All other
//! components treat these as read-only.

mod store;
mod types;
mod view;

pub use store::GenomeStore;
pub use types::{
    HistoryEntry, RequirementDocument, RequirementGenome, Resolution, ResolutionKind, TaskStatus,
};
pub use view::{ViewCoordinator, ViewSelection, ViewSnapshot};
