use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::AudioBackend;
use super::levels::AudioLevelSampler;
use crate::api::TranscriptionBackend;
use crate::error::CaptureError;
use crate::events::SessionEvent;
use crate::session::FeedbackBuffer;

/// PCM accumulated over one recording
#[derive(Debug, Default)]
struct RecordedAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

/// Resources owned for the duration of one recording
struct ActiveCapture {
    recording_id: String,
    backend: Box<dyn AudioBackend>,
    drain: JoinHandle<RecordedAudio>,
}

/// Owns the microphone capture lifecycle: starts a backend, drains its
/// frames into a PCM buffer and the level sampler, and on stop finalizes
/// the buffer into a WAV recording handed to the transcription backend.
///
/// One recording at a time; a second `start` while active is rejected, not
/// queued. Stopping closes the frame channel; the drain loop flushes what
/// the channel already buffered, then finishes.
pub struct AudioCaptureSession {
    transcriber: Arc<dyn TranscriptionBackend>,
    feedback: Arc<FeedbackBuffer>,
    events: tokio::sync::mpsc::Sender<SessionEvent>,
    recording: Arc<AtomicBool>,
    transcribing: Arc<AtomicBool>,
    sampler: Arc<Mutex<AudioLevelSampler>>,
    active: Mutex<Option<ActiveCapture>>,
}

impl AudioCaptureSession {
    pub fn new(
        transcriber: Arc<dyn TranscriptionBackend>,
        feedback: Arc<FeedbackBuffer>,
        events: tokio::sync::mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            transcriber,
            feedback,
            events,
            recording: Arc::new(AtomicBool::new(false)),
            transcribing: Arc::new(AtomicBool::new(false)),
            sampler: Arc::new(Mutex::new(AudioLevelSampler::new())),
            active: Mutex::new(None),
        }
    }

    /// Atomically claim the single-recording slot; fails with
    /// `AlreadyRecording` when a recording is active. A claim is
    /// followed by [`start_reserved`], which gives the slot back when
    /// the stream cannot be opened.
    pub(crate) fn reserve(&self) -> Result<(), CaptureError> {
        if self.recording.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRecording);
        }
        Ok(())
    }

    fn release(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    /// Start recording from the given backend.
    ///
    /// Fails with `AlreadyRecording` when a session is active, or with the
    /// backend's error (typically `PermissionDenied`) when the stream
    /// cannot be opened — in which case no state changes.
    pub async fn start(&self, backend: Box<dyn AudioBackend>) -> Result<(), CaptureError> {
        self.reserve()?;
        self.start_reserved(backend).await
    }

    /// The body of [`start`], entered with the recording slot already held
    pub(crate) async fn start_reserved(
        &self,
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<(), CaptureError> {
        lock(&self.sampler).clear();

        let mut frame_rx = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => {
                self.release();
                return Err(e);
            }
        };

        let recording_id = format!("recording-{}", Uuid::new_v4());
        info!("Recording started: {} ({})", recording_id, backend.name());

        let recording = Arc::clone(&self.recording);
        let sampler = Arc::clone(&self.sampler);

        let drain = tokio::spawn(async move {
            let mut rec = RecordedAudio::default();

            while let Some(frame) = frame_rx.recv().await {
                // After stop, flush whatever the channel already
                // buffered but accept nothing new
                if !recording.load(Ordering::SeqCst) {
                    frame_rx.close();
                }
                if rec.sample_rate == 0 {
                    rec.sample_rate = frame.sample_rate;
                    rec.channels = frame.channels;
                }
                rec.samples.extend_from_slice(&frame.samples);
                lock(&sampler).observe(&frame);
            }

            rec
        });

        let mut active = lock(&self.active);
        *active = Some(ActiveCapture {
            recording_id,
            backend,
            drain,
        });

        Ok(())
    }

    /// Stop recording, release the capture stream unconditionally, and
    /// hand the finalized WAV to the transcription backend.
    ///
    /// The handoff is fire-and-forget: teardown never waits on it. Its
    /// outcome arrives as a `TranscriptReady` or `TranscriptFailed` event.
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let ActiveCapture {
            recording_id,
            mut backend,
            drain,
        } = lock(&self.active).take().ok_or(CaptureError::NotRecording)?;

        self.recording.store(false, Ordering::SeqCst);

        // Stopping the backend closes the frame channel, which ends the
        // drain loop even when no further frame arrives
        if let Err(e) = backend.stop().await {
            warn!("Failed to stop audio backend: {}", e);
        }

        let rec = match drain.await {
            Ok(rec) => rec,
            Err(e) => {
                warn!("Drain task panicked: {}", e);
                RecordedAudio::default()
            }
        };

        info!(
            "Recording stopped: {} ({} samples at {} Hz)",
            recording_id,
            rec.samples.len(),
            rec.sample_rate
        );

        if rec.samples.is_empty() {
            debug!("Empty recording, skipping transcription");
            return Ok(());
        }

        let wav = match encode_wav(&rec) {
            Ok(wav) => wav,
            Err(e) => {
                // Stream and handles are already released; surface the
                // failure the same way a failed transcription would be
                let _ = self
                    .events
                    .send(SessionEvent::TranscriptFailed {
                        message: format!("failed to encode recording: {}", e),
                    })
                    .await;
                return Ok(());
            }
        };

        self.transcribing.store(true, Ordering::SeqCst);

        let transcriber = Arc::clone(&self.transcriber);
        let feedback = Arc::clone(&self.feedback);
        let events = self.events.clone();
        let transcribing = Arc::clone(&self.transcribing);

        tokio::spawn(async move {
            match transcriber.transcribe(wav).await {
                Ok(text) if !text.trim().is_empty() => {
                    feedback.append(text.trim());
                    let _ = events
                        .send(SessionEvent::TranscriptReady {
                            text: text.trim().to_string(),
                        })
                        .await;
                }
                Ok(_) => debug!("Transcription returned no text"),
                Err(e) => {
                    warn!("Transcription failed: {}", e);
                    let _ = events
                        .send(SessionEvent::TranscriptFailed {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
            transcribing.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn is_transcribing(&self) -> bool {
        self.transcribing.load(Ordering::SeqCst)
    }

    /// Current loudness window for waveform display, oldest first
    pub fn levels(&self) -> Vec<f32> {
        lock(&self.sampler).levels()
    }
}

impl Drop for AudioCaptureSession {
    fn drop(&mut self) {
        // Dropping the active capture drops the backend, which closes the
        // frame channel and ends the drain task; the cleared flag stops
        // the loop from waiting on frames that will never come
        self.recording.store(false, Ordering::SeqCst);
    }
}

/// Finalize buffered PCM into a single in-memory WAV object
fn encode_wav(rec: &RecordedAudio) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: rec.channels,
        sample_rate: rec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &sample in &rec.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
