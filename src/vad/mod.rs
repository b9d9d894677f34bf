//! Voice-activity detection and segment emission.

pub mod segmenter;

pub use segmenter::{SegmenterConfig, SegmenterEvent, VoiceSegmenter};
