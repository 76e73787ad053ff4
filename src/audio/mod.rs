pub mod backend;
pub mod capture;
pub mod levels;
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioFrame};
pub use capture::AudioCaptureSession;
pub use levels::{AudioLevelSampler, LEVEL_SAMPLE_INTERVAL, MAX_LEVEL_SAMPLES};
pub use microphone::MicrophoneBackend;
