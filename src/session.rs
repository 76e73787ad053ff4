use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::api::{AnalysisBackend, ApiClient, TranscriptionBackend};
use crate::audio::{AudioBackend, AudioCaptureSession};
use crate::config::Config;
use crate::error::{CaptureError, TaskError};
use crate::events::SessionEvent;
use crate::genome::GenomeStore;
use crate::task::TaskController;

/// Pending feedback text awaiting the next submission.
///
/// Written by the user and by the transcription handoff (space-joined);
/// read and cleared by the task controller on successful submission.
#[derive(Debug, Default)]
pub struct FeedbackBuffer(Mutex<String>);

impl FeedbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, space-joined when the buffer is non-empty
    pub fn append(&self, text: &str) {
        let mut buffer = lock(&self.0);
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(text);
    }

    pub fn peek(&self) -> String {
        lock(&self.0).clone()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.0).is_empty()
    }
}

/// Wires the controller, the capture session, the store, and the shared
/// feedback buffer together, and enforces the mutual-exclusion rules at
/// the interface boundary: no submission while recording, no recording
/// while an analysis task runs.
pub struct AppSession {
    store: Arc<GenomeStore>,
    controller: TaskController,
    capture: AudioCaptureSession,
    feedback: Arc<FeedbackBuffer>,
    // Serializes the check-and-reserve pairs in `submit` and
    // `start_recording`: a submission and a recording can never both
    // pass their preconditions
    exclusion: Mutex<()>,
}

impl AppSession {
    /// Build a session from configuration, using the HTTP client for both
    /// the analysis and transcription collaborators.
    ///
    /// Returns the session plus the receiver of user-facing events.
    pub fn from_config(config: &Config) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let store = Arc::new(GenomeStore::open(&config.state.dir)?);
        let client = Arc::new(ApiClient::new(&config.api.base_url));
        let analysis: Arc<dyn AnalysisBackend> = client.clone();
        let transcription: Arc<dyn TranscriptionBackend> = client;

        Ok(Self::new(
            store,
            analysis,
            transcription,
            Duration::from_secs(config.api.poll_interval_secs),
        ))
    }

    /// Build a session over explicit collaborators (used by tests)
    pub fn new(
        store: Arc<GenomeStore>,
        analysis: Arc<dyn AnalysisBackend>,
        transcription: Arc<dyn TranscriptionBackend>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(32);
        let feedback = Arc::new(FeedbackBuffer::new());

        let controller = TaskController::new(
            analysis,
            Arc::clone(&store),
            Arc::clone(&feedback),
            events_tx.clone(),
            poll_interval,
        );
        let capture =
            AudioCaptureSession::new(transcription, Arc::clone(&feedback), events_tx);

        let session = Self {
            store,
            controller,
            capture,
            feedback,
            exclusion: Mutex::new(()),
        };

        (session, events_rx)
    }

    /// Append user text to the pending feedback buffer
    pub fn push_feedback(&self, text: &str) {
        self.feedback.append(text);
    }

    pub fn pending_feedback(&self) -> String {
        self.feedback.peek()
    }

    /// Submit the pending feedback as a new analysis round
    pub async fn submit(&self) -> Result<Option<String>, TaskError> {
        {
            let _slot = lock(&self.exclusion);
            if self.capture.is_recording() {
                return Err(TaskError::RecordingActive);
            }
            self.controller.reserve()?;
        }
        self.controller.submit_reserved().await
    }

    /// Start recording from the given audio backend
    pub async fn start_recording(
        &self,
        backend: Box<dyn AudioBackend>,
    ) -> Result<(), CaptureError> {
        {
            let _slot = lock(&self.exclusion);
            if self.controller.is_generating() {
                return Err(CaptureError::AnalysisActive);
            }
            self.capture.reserve()?;
        }
        self.capture.start_reserved(backend).await
    }

    /// Stop recording and fire the transcription handoff
    pub async fn stop_recording(&self) -> Result<(), CaptureError> {
        self.capture.stop().await
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn is_transcribing(&self) -> bool {
        self.capture.is_transcribing()
    }

    pub fn is_generating(&self) -> bool {
        self.controller.is_generating()
    }

    /// Current loudness window for waveform display
    pub fn levels(&self) -> Vec<f32> {
        self.capture.levels()
    }

    pub fn store(&self) -> &Arc<GenomeStore> {
        &self.store
    }

    pub fn task_id(&self) -> Option<String> {
        self.controller.task_id()
    }

    /// Cancel the poll loop and stop observing; in-flight transcriptions
    /// are abandoned
    pub fn shutdown(&self) {
        info!("Session shutting down");
        self.controller.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
