pub mod backend;
pub mod encode;
pub mod mic;

pub use backend::{AudioBackend, AudioBackendConfig, AudioFrame};
pub use encode::{EncodedSegment, SegmentEncoder};
pub use mic::MicrophoneBackend;
