use chrono::{DateTime, Utc};
use std::io::Cursor;

use super::backend::AudioFrame;
use crate::error::{Error, Result};

/// One voice segment, encoded and ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedSegment {
    /// WAV container bytes
    pub data: Vec<u8>,
    /// When the segment was closed
    pub captured_at: DateTime<Utc>,
    /// Total PCM samples in the segment
    pub sample_count: usize,
}

/// Encodes accumulated PCM frames into an in-memory WAV container.
///
/// Construction validates that the platform format is encodable; failure is
/// fatal to the recording feature, not to the meeting.
#[derive(Debug, Clone)]
pub struct SegmentEncoder {
    spec: hound::WavSpec,
}

impl SegmentEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        // Trial write: hound rejects unsupported specs (zero rate/channels)
        // on writer creation.
        let mut probe = Cursor::new(Vec::new());
        hound::WavWriter::new(&mut probe, spec)
            .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

        Ok(Self { spec })
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    /// Package the pending frames into one WAV unit.
    pub fn encode(&self, frames: &[AudioFrame]) -> Result<EncodedSegment> {
        let mut cursor = Cursor::new(Vec::new());
        let mut sample_count = 0;

        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.spec)
                .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

            for frame in frames {
                for &sample in &frame.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
                }
                sample_count += frame.samples.len();
            }

            writer
                .finalize()
                .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
        }

        Ok(EncodedSegment {
            data: cursor.into_inner(),
            captured_at: Utc::now(),
            sample_count,
        })
    }
}
