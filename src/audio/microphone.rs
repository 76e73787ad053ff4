use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

/// Microphone capture via cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// duration of the capture; frames cross to the async side over a bounded
/// channel. The thread parks until the capturing flag clears, then drops
/// the stream, releasing the device.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::Backend("microphone already capturing".into()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();

        self.capturing.store(true, Ordering::SeqCst);
        let capturing = Arc::clone(&self.capturing);
        let config = self.config.clone();

        let worker = thread::spawn(move || run_capture(config, frame_tx, ready_tx, capturing));

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                self.capturing.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                self.capturing.store(false, Ordering::SeqCst);
                Err(CaptureError::Backend(
                    "capture thread exited before the stream opened".into(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("Capture thread panicked"),
                Err(e) => warn!("Failed to join capture thread: {}", e),
            }
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        // The worker thread observes the flag and releases the device on
        // its own; nothing to join here.
        self.capturing.store(false, Ordering::SeqCst);
    }
}

/// Owns the cpal stream for the duration of one capture
fn run_capture(
    config: AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    capturing: Arc<AtomicBool>,
) {
    match open_stream(&config, frame_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            while capturing.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            info!("Microphone capture stopped");
        }
        Err(e) => {
            capturing.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(
    want: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::PermissionDenied("no input device available".into()))?;

    let supported = match preferred_input_config(&device, want) {
        Some(config) => config,
        None => device
            .default_input_config()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?,
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    info!(
        "Opening microphone stream: {} Hz, {} channel(s), {:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, frame_tx, |s| {
            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        })?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, frame_tx, |s| s)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, frame_tx, |s| {
            (s as i32 - 32768) as i16
        })?,
        other => {
            return Err(CaptureError::Backend(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;

    Ok(stream)
}

/// Find a device config matching the preferred rate and channel count;
/// `None` means the caller falls back to the device default
fn preferred_input_config(
    device: &cpal::Device,
    want: &AudioBackendConfig,
) -> Option<cpal::SupportedStreamConfig> {
    device
        .supported_input_configs()
        .ok()?
        .find(|range| {
            supports(
                want,
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0,
            )
        })
        .map(|range| range.with_sample_rate(cpal::SampleRate(want.sample_rate)))
}

fn supports(want: &AudioBackendConfig, channels: u16, min_rate: u32, max_rate: u32) -> bool {
    channels == want.channels && (min_rate..=max_rate).contains(&want.sample_rate)
}


fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    convert: fn(T) -> i16,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let started = Instant::now();

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame = AudioFrame {
                    samples: data.iter().map(|&s| convert(s)).collect(),
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                // Drop the frame rather than stall the audio callback when
                // the consumer falls behind
                let _ = frame_tx.try_send(frame);
            },
            move |err| warn!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| CaptureError::Backend(e.to_string()))?;

    Ok(stream)
}
