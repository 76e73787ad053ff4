use anyhow::Result;
use serde::Deserialize;

use crate::audio::AudioBackendConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub state: StateConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the analysis/transcription service
    pub base_url: String,
    /// Seconds between status polls for an in-flight task
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Directory holding the persisted genome, history and status
    pub dir: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_capacity: usize,
}

impl Config {
    /// Load configuration from an optional file over built-in defaults
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("api.base_url", "http://localhost:8000")?
            .set_default("api.poll_interval_secs", 3i64)?
            .set_default("state.dir", ".reqgenome")?
            .set_default("audio.sample_rate", 16000i64)?
            .set_default("audio.channels", 1i64)?
            .set_default("audio.channel_capacity", 64i64)?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            channel_capacity: self.audio.channel_capacity,
        }
    }
}
