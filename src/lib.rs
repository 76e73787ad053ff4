pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod genome;
pub mod session;
pub mod task;

pub use api::{AnalysisBackend, ApiClient, TranscriptionBackend};
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioCaptureSession, AudioFrame, AudioLevelSampler,
    MicrophoneBackend,
};
pub use config::Config;
pub use error::{ApiError, CaptureError, ExportError, TaskError};
pub use events::SessionEvent;
pub use genome::{
    GenomeStore, HistoryEntry, RequirementDocument, RequirementGenome, Resolution, ResolutionKind,
    TaskStatus, ViewCoordinator, ViewSelection, ViewSnapshot,
};
pub use session::{AppSession, FeedbackBuffer};
pub use task::{TaskController, BOOTSTRAP_PROMPT};
