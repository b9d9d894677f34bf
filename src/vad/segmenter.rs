//! Voice-activity-gated audio segmentation.
//!
//! Watches the microphone frame stream, detects speech onset with an energy
//! threshold, and closes a segment only after a sustained quiet period so
//! breaths and plosive gaps do not split utterances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{AudioFrame, EncodedSegment, SegmentEncoder};

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Speech threshold in dBFS
    pub threshold_db: f32,
    /// Quiet time required before a segment is closed
    pub silence: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            threshold_db: -45.0,
            silence: Duration::from_millis(600),
        }
    }
}

/// Side-channel output of the segmenter.
#[derive(Debug, Clone)]
pub enum SegmenterEvent {
    /// Speech onset: capture has started
    Talking,
    /// Speech offset (or segmenter stopped)
    NotTalking,
    /// One contiguous talking span, encoded
    Segment(EncodedSegment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Recording,
}

/// Runs the analysis loop over a frame stream and emits [`SegmenterEvent`]s.
pub struct VoiceSegmenter {
    armed: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl VoiceSegmenter {
    /// Begin monitoring. The encoder is constructed by the caller so an
    /// unsupported platform format surfaces before any task is spawned.
    pub fn start(
        config: SegmenterConfig,
        encoder: SegmentEncoder,
        frames: mpsc::Receiver<AudioFrame>,
        events: mpsc::Sender<SegmenterEvent>,
    ) -> Self {
        let armed = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_loop(
            config,
            encoder,
            frames,
            events,
            Arc::clone(&armed),
            shutdown_rx,
        ));

        info!("Voice segmenter armed");

        Self {
            armed,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Halt the loop, emit a final not-talking event, and discard any
    /// in-progress capture. Idempotent.
    pub async fn stop(&mut self) {
        self.armed.store(false, Ordering::SeqCst);

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Segmenter task panicked: {}", e);
            }
        }
    }
}

async fn run_loop(
    config: SegmenterConfig,
    encoder: SegmentEncoder,
    mut frames: mpsc::Receiver<AudioFrame>,
    events: mpsc::Sender<SegmenterEvent>,
    armed: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut capture = CaptureState::Idle;
    let mut pending: Vec<AudioFrame> = Vec::new();
    // Non-null only while recording below threshold; cleared by any loud frame.
    let mut silence_deadline: Option<Instant> = None;

    loop {
        // select! evaluates the sleep expression even when the branch is
        // disabled, so give it a placeholder deadline when none is armed.
        let deadline = silence_deadline
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400));

        tokio::select! {
            _ = &mut shutdown => {
                let _ = events.send(SegmenterEvent::NotTalking).await;
                break;
            }

            _ = tokio::time::sleep_until(deadline), if silence_deadline.is_some() => {
                silence_deadline = None;
                capture = CaptureState::Idle;
                debug!("Silence window elapsed, closing segment");

                let _ = events.send(SegmenterEvent::NotTalking).await;

                if !pending.is_empty() {
                    match encoder.encode(&pending) {
                        Ok(segment) => {
                            let _ = events.send(SegmenterEvent::Segment(segment)).await;
                        }
                        Err(e) => warn!("Failed to encode voice segment: {}", e),
                    }
                    // Keep the first buffer of the completed span so a
                    // boundary frame between rapid utterances is not lost.
                    let seed = pending[0].clone();
                    pending.clear();
                    pending.push(seed);
                }
            }

            frame = frames.recv() => {
                let Some(frame) = frame else {
                    let _ = events.send(SegmenterEvent::NotTalking).await;
                    break;
                };

                if !armed.load(Ordering::SeqCst) {
                    continue;
                }

                let db = frame.level_db();

                if db > config.threshold_db {
                    if capture == CaptureState::Idle {
                        capture = CaptureState::Recording;
                        debug!("Speech onset at {:.1} dB", db);
                        let _ = events.send(SegmenterEvent::Talking).await;
                    }
                    silence_deadline = None;
                    pending.push(frame);
                } else if capture == CaptureState::Recording {
                    pending.push(frame);
                    if silence_deadline.is_none() {
                        silence_deadline = Some(Instant::now() + config.silence);
                    }
                }
            }
        }
    }
}
