use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use super::messages::{FeedbackRequest, FeedbackResponse, TranscribeResponse};
use crate::error::ApiError;
use crate::genome::{RequirementGenome, TaskStatus};

/// The remote requirement-analysis service, seen from the client side
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Submit a round of feedback plus the current genome; returns the
    /// identifier of the task the backend queued for it
    async fn submit_feedback(
        &self,
        feedback: &str,
        state: &RequirementGenome,
    ) -> Result<String, ApiError>;

    /// Fetch the current status of an in-flight task
    async fn poll_status(&self, task_id: &str) -> Result<TaskStatus, ApiError>;
}

/// The transcription service, seen from the client side
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe a finished WAV recording to text
    async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, ApiError>;
}

/// HTTP client for the analysis and transcription endpoints
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnalysisBackend for ApiClient {
    async fn submit_feedback(
        &self,
        feedback: &str,
        state: &RequirementGenome,
    ) -> Result<String, ApiError> {
        let body = FeedbackRequest {
            feedback: feedback.to_string(),
            state: state.clone(),
        };

        let response = self
            .http
            .post(format!("{}/api/feedback", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let parsed: FeedbackResponse = response.json().await?;
        info!("Feedback submitted, task {}", parsed.task_id);

        Ok(parsed.task_id)
    }

    async fn poll_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/status/{}", self.base_url, task_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let status: TaskStatus = response.json().await?;
        debug!("Task {} is {}", task_id, status.label());

        Ok(status)
    }
}

#[async_trait]
impl TranscriptionBackend for ApiClient {
    async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, ApiError> {
        let size = wav_bytes.len();

        let part = Part::bytes(wav_bytes)
            .file_name("recording.wav")
            .mime_str("audio/wav")?;
        let form = Form::new().part("audio_file", part);

        let response = self
            .http
            .post(format!("{}/api/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let parsed: TranscribeResponse = response.json().await?;
        info!("Transcribed {} byte recording", size);

        Ok(parsed.text)
    }
}
