//! HTTP boundary to the remote analysis and transcription service:
//! - `POST /api/feedback` — submit feedback + genome, get a task id
//! - `GET /api/status/{task_id}` — poll task status
//! - `POST /api/transcribe` — multipart WAV upload, get text back

mod client;
mod messages;

pub use client::{AnalysisBackend, ApiClient, TranscriptionBackend};
pub use messages::{FeedbackRequest, FeedbackResponse, TranscribeResponse};
