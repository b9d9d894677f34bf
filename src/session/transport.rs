use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::error::Result;
use crate::signaling::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Events a transport reports back to the coordinator, tagged with the
/// participant the transport belongs to.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound media arrived; first occurrence moves the peer to Connected.
    RemoteMedia {
        participant_id: String,
        kind: MediaKind,
    },
    /// A local network path was discovered and should be relayed to the peer.
    Candidate {
        participant_id: String,
        candidate: IceCandidate,
    },
}

/// Live transport for exactly one remote participant.
///
/// The transport owns its own candidate buffering: candidates arriving
/// before the remote description are queued or ignored per the underlying
/// stack's contract, not re-implemented here.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Generate a local offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Generate a local answer and install it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Install a remote offer or answer.
    async fn apply_remote(&self, desc: &SessionDescription) -> Result<()>;

    /// Apply a relayed ICE candidate.
    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Tear the transport down, releasing its resources.
    async fn close(&self) -> Result<()>;
}

/// Creates transports with local media already attached and their callbacks
/// registered against the coordinator's event channel.
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        participant_id: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;

    /// Sink for local microphone frames, when this factory carries real
    /// outbound media. Test factories return `None`.
    fn local_audio_sink(&self) -> Option<mpsc::Sender<AudioFrame>> {
        None
    }
}
