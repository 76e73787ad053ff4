use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for an audio capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Preferred sample rate; backends may deliver the device's native
    /// rate instead, stamped on every frame
    pub sample_rate: u32,
    /// Preferred channel count (1 = mono)
    pub channels: u16,
    /// Capacity of the frame channel; frames are dropped rather than
    /// blocking the audio callback when the consumer falls behind
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            channel_capacity: 64,
        }
    }
}

/// Audio capture backend trait.
///
/// The capture session owns a backend for the duration of one recording
/// and drains its frame channel until stopped.
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing audio.
    ///
    /// Returns a channel receiver that will receive audio frames.
    /// Fails with `CaptureError::PermissionDenied` when no usable input
    /// device is available.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if the backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}
