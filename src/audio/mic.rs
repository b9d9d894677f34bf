// Microphone capture backend using cpal.
//
// cpal streams are not Send, so the stream lives on a dedicated thread
// that parks until stop is signalled.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        info!(
            "Microphone backend initialized ({}Hz, {} channels, {}ms buffers)",
            config.target_sample_rate, config.target_channels, config.buffer_duration_ms
        );

        Ok(Self {
            config,
            stop_tx: None,
            thread: None,
            capturing: false,
        })
    }

    fn run_capture(
        config: AudioBackendConfig,
        frame_tx: mpsc::Sender<AudioFrame>,
        ready_tx: oneshot::Sender<Result<()>>,
        stop_rx: std_mpsc::Receiver<()>,
    ) {
        let stream = match Self::build_stream(&config, frame_tx) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        // Park until stop() or until the backend is dropped
        let _ = stop_rx.recv();
        drop(stream);
        info!("Microphone capture thread exiting");
    }

    fn build_stream(
        config: &AudioBackendConfig,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;

        let supported = device
            .default_input_config()
            .context("failed to query default input config")?;

        info!(
            "Capturing from {:?} ({:?})",
            device.name().unwrap_or_else(|_| "unknown".into()),
            supported
        );

        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_typed_stream::<f32>(&device, &stream_config, config, frame_tx)?
            }
            SampleFormat::I16 => {
                Self::build_typed_stream::<i16>(&device, &stream_config, config, frame_tx)?
            }
            SampleFormat::U16 => {
                Self::build_typed_stream::<u16>(&device, &stream_config, config, frame_tx)?
            }
            other => bail!("unsupported sample format: {:?}", other),
        };

        stream.play().context("failed to start input stream")?;
        Ok(stream)
    }

    fn build_typed_stream<T>(
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        config: &AudioBackendConfig,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + Send + 'static,
        i16: FromSample<T>,
    {
        let device_channels = stream_config.channels;
        let device_rate = stream_config.sample_rate.0;
        let target_rate = config.target_sample_rate.min(device_rate);
        let target_channels = config.target_channels;

        let samples_per_frame = (target_rate as u64 * config.buffer_duration_ms / 1000) as usize
            * target_channels as usize;
        let samples_per_frame = samples_per_frame.max(1);

        let started = Instant::now();
        let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame * 2);

        let err_fn = |err| warn!("input stream error: {}", err);

        let stream = device.build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                let samples = downmix(&samples, device_channels, target_channels);
                let samples = decimate(&samples, device_rate, target_rate, target_channels);

                pending.extend_from_slice(&samples);

                while pending.len() >= samples_per_frame {
                    let rest = pending.split_off(samples_per_frame);
                    let frame_samples = std::mem::replace(&mut pending, rest);

                    let frame = AudioFrame {
                        samples: frame_samples,
                        sample_rate: target_rate,
                        channels: target_channels,
                        timestamp_ms: started.elapsed().as_millis() as u64,
                    };

                    // A full channel means the consumer is behind; dropping the
                    // frame keeps the capture callback from blocking.
                    if frame_tx.try_send(frame).is_err() {
                        break;
                    }
                }
            },
            err_fn,
            None,
        )?;

        Ok(stream)
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing {
            bail!("already capturing");
        }

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let config = self.config.clone();
        let thread = std::thread::spawn(move || {
            Self::run_capture(config, frame_tx, ready_tx, stop_rx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => bail!("capture thread exited before reporting readiness"),
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        self.capturing = true;

        info!("Microphone capture started");
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.capturing = false;

        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Average interleaved device channels down to the target channel count.
/// Only stereo-to-mono is folded; other mismatches pass through.
fn downmix(samples: &[i16], device_channels: u16, target_channels: u16) -> Vec<i16> {
    if device_channels == 2 && target_channels == 1 {
        samples
            .chunks_exact(2)
            .map(|pair| {
                let sum = pair[0] as i32 + pair[1] as i32;
                (sum / 2) as i16
            })
            .collect()
    } else {
        samples.to_vec()
    }
}

/// Decimate to the target rate by taking every Nth sample group.
fn decimate(samples: &[i16], device_rate: u32, target_rate: u32, channels: u16) -> Vec<i16> {
    if device_rate <= target_rate || target_rate == 0 {
        return samples.to_vec();
    }

    let ratio = (device_rate / target_rate) as usize;
    if ratio <= 1 {
        return samples.to_vec();
    }

    let group = channels as usize;
    samples
        .chunks_exact(group)
        .step_by(ratio)
        .flatten()
        .copied()
        .collect()
}
