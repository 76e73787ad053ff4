use serde::{Deserialize, Serialize};

/// The living snapshot of gathered requirements.
///
/// Exactly one genome exists at a time. It is replaced wholesale (never
/// field-merged) whenever a resolved round supplies an `updated_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementGenome {
    /// Analysis round, monotonically non-decreasing, starts at 0
    pub round: u32,

    /// Free-text summary (markdown) produced by the analysis backend
    #[serde(default)]
    pub requirements_summary: String,

    #[serde(default)]
    pub features: Vec<String>,

    #[serde(default)]
    pub user_stories: Vec<String>,

    #[serde(default)]
    pub constraints: Vec<String>,

    /// Open questions the backend wants answered before the next round
    #[serde(default)]
    pub clarifications_needed: Vec<String>,
}

impl Default for RequirementGenome {
    fn default() -> Self {
        Self {
            round: 0,
            requirements_summary: String::new(),
            features: Vec::new(),
            user_stories: Vec::new(),
            constraints: Vec::new(),
            clarifications_needed: Vec::new(),
        }
    }
}

/// Requirement document produced by the backend.
///
/// Opaque to this client: it is persisted, displayed and exported as-is,
/// with no shape validation beyond presence checks. Keeping it as a raw
/// JSON value guarantees fields we do not know about survive round-trips.
pub type RequirementDocument = serde_json::Value;

/// Payload shared by the `completed` and `clarifying` statuses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default)]
    pub round: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<RequirementDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifications_needed: Option<Vec<String>>,

    /// Full replacement genome. Absent on some clarifying rounds, in which
    /// case the live genome is left untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_state: Option<RequirementGenome>,
}

/// Task status as reported by `GET /api/status/{task_id}`.
///
/// Tagged variant: each status carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed(Resolution),
    Clarifying(Resolution),
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TaskStatus {
    /// Resolution payload, if this status carries one
    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            TaskStatus::Completed(res) | TaskStatus::Clarifying(res) => Some(res),
            _ => None,
        }
    }

    /// Round number, when known
    pub fn round(&self) -> Option<u32> {
        self.resolution().map(|res| res.round)
    }

    /// Document attached to this status, when present
    pub fn document(&self) -> Option<&RequirementDocument> {
        self.resolution().and_then(|res| res.document.as_ref())
    }

    /// Whether this status ends the polling loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed(_) | TaskStatus::Clarifying(_) | TaskStatus::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed(_) => "completed",
            TaskStatus::Clarifying(_) => "clarifying",
            TaskStatus::Failed { .. } => "failed",
        }
    }
}

/// Which kind of resolution a history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Completed,
    Clarifying,
}

/// Immutable archival record of one resolved round.
///
/// Entries are appended in poll-arrival order and never mutated or removed
/// except by a full reset. Several entries may share a round number (a
/// clarifying response followed by a completed one), so consumers
/// disambiguate by position, not by round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: ResolutionKind,

    #[serde(flatten)]
    pub resolution: Resolution,
}

impl HistoryEntry {
    /// Build a history entry from a terminal-with-payload status.
    ///
    /// Returns `None` for statuses that do not archive (queued, processing,
    /// failed) — a failed task never appends history.
    pub fn from_status(status: &TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed(res) => Some(Self {
                status: ResolutionKind::Completed,
                resolution: res.clone(),
            }),
            TaskStatus::Clarifying(res) => Some(Self {
                status: ResolutionKind::Clarifying,
                resolution: res.clone(),
            }),
            _ => None,
        }
    }
}
