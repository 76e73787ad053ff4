use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::backend::AudioFrame;

/// Most recent samples kept for display (10 per second for 10 seconds)
pub const MAX_LEVEL_SAMPLES: usize = 100;

/// Wall-clock spacing between recorded samples
pub const LEVEL_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Amplitude treated as full scale when normalizing. Speech over a typical
/// microphone rarely averages above a quarter of i16 range.
const REFERENCE_CEILING: f32 = 8192.0;

/// Reduces a live audio stream to a bounded, time-windowed sequence of
/// normalized loudness samples for waveform display.
///
/// Frames are observed continuously but a sample is only recorded every
/// [`LEVEL_SAMPLE_INTERVAL`] of wall-clock time, independent of the frame
/// rate, giving a predictable ~10 samples/second cadence. The window keeps
/// the most recent [`MAX_LEVEL_SAMPLES`] entries, trimmed FIFO.
#[derive(Debug)]
pub struct AudioLevelSampler {
    window: VecDeque<f32>,
    last_sample: Option<Instant>,
}

impl AudioLevelSampler {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(MAX_LEVEL_SAMPLES),
            last_sample: None,
        }
    }

    /// Observe a frame, recording a sample if the throttle interval has
    /// elapsed. Returns the recorded level, if any.
    pub fn observe(&mut self, frame: &AudioFrame) -> Option<f32> {
        self.observe_at(frame, Instant::now())
    }

    /// Same as [`observe`](Self::observe) with an explicit clock, so the
    /// throttle is testable without real waiting.
    pub fn observe_at(&mut self, frame: &AudioFrame, now: Instant) -> Option<f32> {
        match self.last_sample {
            None => {
                // First observation establishes the baseline; the first
                // recorded sample lands one interval later.
                self.last_sample = Some(now);
                None
            }
            Some(last) if now.duration_since(last) >= LEVEL_SAMPLE_INTERVAL => {
                let level = loudness_of(frame);
                self.window.push_back(level);
                while self.window.len() > MAX_LEVEL_SAMPLES {
                    self.window.pop_front();
                }
                self.last_sample = Some(now);
                Some(level)
            }
            Some(_) => None,
        }
    }

    /// Current window, oldest first
    pub fn levels(&self) -> Vec<f32> {
        self.window.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard the window and throttle baseline for a new recording
    pub fn clear(&mut self) {
        self.window.clear();
        self.last_sample = None;
    }
}

impl Default for AudioLevelSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean absolute amplitude normalized to [0, 1]
fn loudness_of(frame: &AudioFrame) -> f32 {
    if frame.samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .samples
        .iter()
        .map(|&s| (s as f64).abs())
        .sum();
    let mean = (sum / frame.samples.len() as f64) as f32;
    (mean / REFERENCE_CEILING).clamp(0.0, 1.0)
}
