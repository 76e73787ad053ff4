// Integration tests for the genome store: append-only history, wholesale
// genome replacement, persistence and rehydration, reset, and the
// read-only view projection.

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use reqgenome::{
    GenomeStore, HistoryEntry, RequirementGenome, Resolution, ResolutionKind, TaskStatus,
    ViewCoordinator, ViewSelection,
};

fn completed_entry(round: u32, updated_state: Option<RequirementGenome>) -> HistoryEntry {
    HistoryEntry {
        status: ResolutionKind::Completed,
        resolution: Resolution {
            round,
            document: Some(serde_json::json!({
                "project": { "name": "Todo", "description": "A todo app" }
            })),
            clarifications_needed: None,
            updated_state,
        },
    }
}

fn clarifying_entry(round: u32) -> HistoryEntry {
    HistoryEntry {
        status: ResolutionKind::Clarifying,
        resolution: Resolution {
            round,
            document: None,
            clarifications_needed: Some(vec!["Who are the users?".to_string()]),
            updated_state: None,
        },
    }
}

fn genome_at(round: u32) -> RequirementGenome {
    RequirementGenome {
        round,
        requirements_summary: format!("summary after round {}", round),
        features: vec!["feature-a".to_string()],
        user_stories: vec!["story-1".to_string()],
        constraints: vec![],
        clarifications_needed: vec![],
    }
}

#[test]
fn history_length_equals_number_of_resolutions() -> Result<()> {
    let dir = TempDir::new()?;
    let store = GenomeStore::open(dir.path())?;

    // Duplicate rounds are kept: no dedup, no loss
    store.apply_resolution(clarifying_entry(1));
    store.apply_resolution(clarifying_entry(1));
    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    store.apply_resolution(clarifying_entry(2));
    store.apply_resolution(completed_entry(2, Some(genome_at(2))));

    assert_eq!(store.history_len(), 5);
    Ok(())
}

#[test]
fn resolution_without_updated_state_leaves_genome_untouched() -> Result<()> {
    let dir = TempDir::new()?;
    let store = GenomeStore::open(dir.path())?;

    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    let before = store.genome();

    store.apply_resolution(clarifying_entry(2));

    assert_eq!(store.genome(), before);
    Ok(())
}

#[test]
fn resolution_with_updated_state_replaces_genome_wholesale() -> Result<()> {
    let dir = TempDir::new()?;
    let store = GenomeStore::open(dir.path())?;

    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    assert_eq!(store.genome().features, vec!["feature-a".to_string()]);

    // The replacement has no features: old fields are gone, not merged
    let replacement = RequirementGenome {
        round: 2,
        requirements_summary: "rewritten".to_string(),
        constraints: vec!["must run offline".to_string()],
        ..RequirementGenome::default()
    };
    store.apply_resolution(completed_entry(2, Some(replacement.clone())));

    assert_eq!(store.genome(), replacement);
    assert!(store.genome().features.is_empty());
    Ok(())
}

#[test]
fn reset_restores_zero_state_and_removes_persisted_files() -> Result<()> {
    let dir = TempDir::new()?;
    let store = GenomeStore::open(dir.path())?;

    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    store.set_status(Some(TaskStatus::Processing));

    store.reset();

    assert_eq!(store.genome(), RequirementGenome::default());
    assert_eq!(store.genome().round, 0);
    assert!(store.history().is_empty());
    assert!(store.status().is_none());

    for key in [
        "requirement_genome",
        "requirement_history",
        "requirement_status",
    ] {
        assert!(
            !dir.path().join(format!("{}.json", key)).exists(),
            "{} should be removed on reset",
            key
        );
    }
    Ok(())
}

#[test]
fn state_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;

    {
        let store = GenomeStore::open(dir.path())?;
        store.apply_resolution(clarifying_entry(1));
        store.apply_resolution(completed_entry(1, Some(genome_at(1))));
        store.set_status(Some(TaskStatus::Completed(Resolution {
            round: 1,
            ..Resolution::default()
        })));
    }

    let reopened = GenomeStore::open(dir.path())?;
    assert_eq!(reopened.history_len(), 2);
    assert_eq!(reopened.genome(), genome_at(1));
    assert_eq!(reopened.status().map(|s| s.label()), Some("completed"));
    Ok(())
}

#[test]
fn corrupt_persisted_state_loads_as_default() -> Result<()> {
    let dir = TempDir::new()?;

    std::fs::write(dir.path().join("requirement_genome.json"), "{not json")?;
    std::fs::write(dir.path().join("requirement_history.json"), "42")?;

    let store = GenomeStore::open(dir.path())?;
    assert_eq!(store.genome(), RequirementGenome::default());
    assert!(store.history().is_empty());
    Ok(())
}

#[test]
fn view_selects_archived_snapshot_when_entry_carries_one() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(GenomeStore::open(dir.path())?);

    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    store.apply_resolution(completed_entry(2, Some(genome_at(2))));

    let coordinator = ViewCoordinator::new(Arc::clone(&store));

    let snapshot = coordinator.snapshot_of(ViewSelection::Round(0));
    assert_eq!(snapshot.genome, genome_at(1));
    assert!(snapshot.entry.is_some());
    assert!(snapshot.status.is_none());

    // Live genome stays at the latest round regardless of selection
    assert_eq!(store.genome(), genome_at(2));
    Ok(())
}

#[test]
fn view_without_snapshot_falls_back_to_live_genome() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(GenomeStore::open(dir.path())?);

    store.apply_resolution(completed_entry(1, Some(genome_at(1))));
    store.apply_resolution(clarifying_entry(2));

    let coordinator = ViewCoordinator::new(Arc::clone(&store));
    let snapshot = coordinator.snapshot_of(ViewSelection::Round(1));

    assert_eq!(snapshot.genome, genome_at(1));
    assert_eq!(
        snapshot.entry.map(|e| e.status),
        Some(ResolutionKind::Clarifying)
    );
    Ok(())
}

#[test]
fn view_out_of_range_falls_back_to_current() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(GenomeStore::open(dir.path())?);

    store.set_status(Some(TaskStatus::Queued));

    let coordinator = ViewCoordinator::new(Arc::clone(&store));
    let snapshot = coordinator.snapshot_of(ViewSelection::Round(7));

    assert_eq!(snapshot.selection, ViewSelection::Current);
    assert_eq!(snapshot.status, Some(TaskStatus::Queued));
    assert!(snapshot.entry.is_none());
    Ok(())
}

#[test]
fn wire_status_deserializes_as_tagged_variant() -> Result<()> {
    let completed: TaskStatus = serde_json::from_str(
        r#"{
            "status": "completed",
            "round": 1,
            "document": { "project": { "name": "Todo", "description": "app" } },
            "updated_state": { "round": 1, "requirements_summary": "done" }
        }"#,
    )?;
    match &completed {
        TaskStatus::Completed(res) => {
            assert_eq!(res.round, 1);
            assert!(res.document.is_some());
            assert_eq!(res.updated_state.as_ref().map(|s| s.round), Some(1));
        }
        other => panic!("expected completed, got {:?}", other),
    }

    let failed: TaskStatus =
        serde_json::from_str(r#"{ "status": "failed", "error": "LLM timeout" }"#)?;
    assert_eq!(
        failed,
        TaskStatus::Failed {
            error: Some("LLM timeout".to_string())
        }
    );

    let queued: TaskStatus = serde_json::from_str(r#"{ "status": "queued" }"#)?;
    assert_eq!(queued, TaskStatus::Queued);
    Ok(())
}

#[test]
fn history_entry_round_trips_with_flattened_resolution() -> Result<()> {
    let entry = completed_entry(3, Some(genome_at(3)));
    let json = serde_json::to_value(&entry)?;

    assert_eq!(json["status"], "completed");
    assert_eq!(json["round"], 3);

    let back: HistoryEntry = serde_json::from_value(json)?;
    assert_eq!(back, entry);
    Ok(())
}
