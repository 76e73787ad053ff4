use crate::genome::{ResolutionKind, TaskStatus};

/// User-facing notifications emitted by background tasks.
///
/// The poll loop and the transcription handoff both run detached from the
/// caller, so anything the user must see travels over this channel instead
/// of a return value.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A poll response replaced the displayed status
    StatusChanged(TaskStatus),

    /// A round resolved and was appended to history
    RoundResolved { round: u32, kind: ResolutionKind },

    /// The backend reported the task failed; genome and history untouched
    TaskFailed { message: String },

    /// A recording was transcribed and appended to the pending feedback
    TranscriptReady { text: String },

    /// Transcription failed; the pending feedback buffer is unchanged
    TranscriptFailed { message: String },
}
