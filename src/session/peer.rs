use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::transport::PeerTransport;
use crate::signaling::{ClientEvent, SdpType, SessionDescription, SignalingChannel};
use crate::signaling::IceCandidate;

/// Lifecycle of one participant connection. Closed is terminal: a rejoining
/// participant gets a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Negotiating,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Work items applied strictly in arrival order per participant.
#[derive(Debug)]
pub(crate) enum PeerCommand {
    /// Generate and send an offer (existing side initiates toward newcomers)
    Offer,
    /// Apply a remote description; offers are answered back
    Remote(SessionDescription),
    /// Apply a relayed ICE candidate
    Candidate(IceCandidate),
}

/// Registry entry: exactly one per participant id at any time.
pub(crate) struct PeerRecord {
    pub state: ConnectionState,
    pub transport: Arc<dyn PeerTransport>,
    pub commands: mpsc::UnboundedSender<PeerCommand>,
    pub worker: JoinHandle<()>,
}

/// Spawn the per-peer negotiation worker. SDP and candidate application are
/// order-sensitive, so one worker drains one queue; peers negotiate
/// independently of each other.
///
/// Signaling sends are fire-and-forget: failures are logged and the peer is
/// left negotiating, which the UI shows as an absent participant.
pub(crate) fn spawn_worker(
    participant_id: String,
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingChannel>,
    mut commands: mpsc::UnboundedReceiver<PeerCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                PeerCommand::Offer => {
                    let offer = match transport.create_offer().await {
                        Ok(offer) => offer,
                        Err(e) => {
                            warn!("Failed to create offer for {}: {}", participant_id, e);
                            continue;
                        }
                    };
                    send_signal(&signaling, &participant_id, Some(offer), None).await;
                }
                PeerCommand::Remote(desc) => {
                    if let Err(e) = transport.apply_remote(&desc).await {
                        warn!(
                            "Failed to apply remote description from {}: {}",
                            participant_id, e
                        );
                        continue;
                    }

                    if desc.kind == SdpType::Offer {
                        match transport.create_answer().await {
                            Ok(answer) => {
                                send_signal(&signaling, &participant_id, Some(answer), None).await;
                            }
                            Err(e) => {
                                warn!("Failed to answer {}: {}", participant_id, e);
                            }
                        }
                    }
                    // An answer completes negotiation; nothing to send back.
                }
                PeerCommand::Candidate(candidate) => {
                    if let Err(e) = transport.add_candidate(&candidate).await {
                        warn!("Failed to add candidate from {}: {}", participant_id, e);
                    }
                }
            }
        }

        debug!("Negotiation worker for {} finished", participant_id);
    })
}

async fn send_signal(
    signaling: &Arc<dyn SignalingChannel>,
    target: &str,
    sdp: Option<SessionDescription>,
    candidate: Option<IceCandidate>,
) {
    let event = ClientEvent::Signal {
        target: target.to_string(),
        sdp,
        candidate,
    };

    if let Err(e) = signaling.publish(event).await {
        warn!("Failed to relay signal to {}: {}", target, e);
    }
}
