use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::{AudioBackend, AudioBackendConfig, AudioFrame, MicrophoneBackend};
use crate::error::{Error, Result};

/// Device constraints requested at acquisition time. Echo cancellation and
/// noise suppression are requests, honored where the platform supports them.
#[derive(Debug, Clone)]
pub struct MediaConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub audio: AudioBackendConfig,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            audio: AudioBackendConfig::default(),
        }
    }
}

/// The local capture resource for one meeting. Owned by the coordinator and
/// released exactly once on leave. The enabled flag is the mute switch; the
/// frame fan-out honors it without stopping the device.
pub struct LocalMedia {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    audio_enabled: Arc<AtomicBool>,
    backend: Box<dyn AudioBackend>,
}

impl LocalMedia {
    pub fn new(backend: Box<dyn AudioBackend>, frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            frames: Some(frames),
            audio_enabled: Arc::new(AtomicBool::new(true)),
            backend,
        }
    }

    /// Take the microphone frame stream. Yields `Some` once.
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.take()
    }

    pub fn audio_enabled(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.audio_enabled)
    }

    /// Stop the capture device.
    pub async fn release(mut self) {
        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop {} backend: {}", self.backend.name(), e);
        }
    }
}

/// Acquires the local camera/microphone. Injected so tests can feed
/// synthetic frames.
#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    /// Fails with [`Error::MediaAcquisition`] when the platform denies
    /// device access; the caller must not proceed to signaling.
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;
}

/// Default provider: cpal microphone capture.
pub struct CpalMediaProvider;

#[async_trait::async_trait]
impl MediaProvider for CpalMediaProvider {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        info!(
            "Acquiring local media (echo_cancellation={}, noise_suppression={})",
            constraints.echo_cancellation, constraints.noise_suppression
        );

        let mut backend = MicrophoneBackend::new(constraints.audio.clone())
            .map_err(|e| Error::MediaAcquisition(e.to_string()))?;

        let frames = backend
            .start()
            .await
            .map_err(|e| Error::MediaAcquisition(e.to_string()))?;

        Ok(LocalMedia::new(Box::new(backend), frames))
    }
}
