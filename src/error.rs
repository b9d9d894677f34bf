use thiserror::Error;

/// Errors surfaced by the meeting core.
///
/// Mid-session negotiation problems are deliberately absent: a lost
/// offer/answer/candidate leaves a peer stuck negotiating, which is
/// observable as a missing remote stream, not as an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Camera/microphone denied or unavailable. Fatal to `join`.
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// No encodable audio container available. Fatal to the voice
    /// segmenter only; the meeting itself proceeds.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Signaling channel connect/publish/subscribe failure.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Peer transport failure (offer/answer/candidate/close).
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
