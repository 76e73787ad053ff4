use serde::{Deserialize, Serialize};

use crate::genome::RequirementGenome;

/// Body of `POST /api/feedback`
#[derive(Debug, Serialize)]
pub struct FeedbackRequest {
    pub feedback: String,
    pub state: RequirementGenome,
}

/// Response of `POST /api/feedback`
#[derive(Debug, Deserialize)]
pub struct FeedbackResponse {
    pub task_id: String,
}

/// Response of `POST /api/transcribe`
#[derive(Debug, Deserialize)]
pub struct TranscribeResponse {
    #[serde(default)]
    pub text: String,
}
