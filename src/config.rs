use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub signaling: SignalingConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub session: SessionFlags,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// NATS server acting as the signaling relay
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech threshold in dBFS
    pub threshold_db: f32,
    /// Quiet time before a segment is closed, in milliseconds
    pub silence_duration_ms: u64,
}

/// Feature flags for the session coordinator. Optional behaviors are
/// gated individually instead of shipping divergent client builds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionFlags {
    /// Run the voice-activity segmenter on the microphone stream
    pub voice_segments: bool,
    /// Track remote speaking-state indicators
    pub speaker_indicators: bool,
    /// Visible remote-stream window size (0 shows everything)
    pub stream_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            audio: AudioConfig::default(),
            vad: VadConfig::default(),
            session: SessionFlags::default(),
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            buffer_duration_ms: 100,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold_db: -45.0,
            silence_duration_ms: 600,
        }
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            voice_segments: true,
            speaker_indicators: true,
            stream_page_size: 3,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
