pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod signaling;
pub mod vad;

pub use audio::{AudioBackend, AudioBackendConfig, AudioFrame, EncodedSegment, SegmentEncoder};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    ConnectionState, CoordinatorConfig, MediaConstraints, SessionCoordinator, SessionEvent,
};
pub use signaling::{ClientEvent, IceCandidate, ServerEvent, SessionDescription, SignalingChannel};
pub use vad::{SegmenterConfig, SegmenterEvent, VoiceSegmenter};
