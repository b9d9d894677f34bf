//! Peer transport backed by the `webrtc` crate. One `RTCPeerConnection`
//! per remote participant, all sharing a single local audio track.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::transport::{MediaKind, PeerTransport, TransportEvent, TransportFactory};
use crate::audio::AudioFrame;
use crate::error::{Error, Result};
use crate::signaling::{IceCandidate, SdpType, SessionDescription};

const STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Builds one peer connection per participant. The factory owns the shared
/// outbound audio track and the pump feeding microphone frames into it.
pub struct WebRtcTransportFactory {
    api: API,
    audio_track: Arc<TrackLocalStaticSample>,
    sink_tx: mpsc::Sender<AudioFrame>,
}

impl WebRtcTransportFactory {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Transport(format!("codec registration failed: {e}")))?;

        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "huddle-client".to_owned(),
        ));

        let (sink_tx, sink_rx) = mpsc::channel(64);
        tokio::spawn(pump_audio(sink_rx, Arc::clone(&audio_track)));

        Ok(Self {
            api,
            audio_track,
            sink_tx,
        })
    }

    fn rtc_config() -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![STUN_SERVER.to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        participant_id: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let pc = self
            .api
            .new_peer_connection(Self::rtc_config())
            .await
            .map_err(|e| Error::Transport(format!("peer connection failed: {e}")))?;
        let pc = Arc::new(pc);

        pc.add_track(Arc::clone(&self.audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::Transport(format!("failed to attach audio track: {e}")))?;

        register_callbacks(&pc, participant_id, events);

        Ok(Arc::new(RtcPeerTransport {
            participant_id: participant_id.to_string(),
            pc,
        }))
    }

    fn local_audio_sink(&self) -> Option<mpsc::Sender<AudioFrame>> {
        Some(self.sink_tx.clone())
    }
}

fn register_callbacks(
    pc: &Arc<RTCPeerConnection>,
    participant_id: &str,
    events: mpsc::Sender<TransportEvent>,
) {
    let track_events = events.clone();
    let track_participant = participant_id.to_string();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let events = track_events.clone();
            let participant_id = track_participant.clone();
            let kind = match track.kind() {
                RTPCodecType::Video => MediaKind::Video,
                _ => MediaKind::Audio,
            };
            Box::pin(async move {
                let _ = events
                    .send(TransportEvent::RemoteMedia {
                        participant_id,
                        kind,
                    })
                    .await;
            })
        },
    ));

    let candidate_participant = participant_id.to_string();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = events.clone();
        let participant_id = candidate_participant.clone();
        Box::pin(async move {
            // None marks end of gathering; nothing to relay.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    let _ = events
                        .send(TransportEvent::Candidate {
                            participant_id,
                            candidate: IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            },
                        })
                        .await;
                }
                Err(e) => warn!("Failed to serialize local candidate: {}", e),
            }
        })
    }));

    let state_participant = participant_id.to_string();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let participant_id = state_participant.clone();
        Box::pin(async move {
            debug!("Connection to {} is now {}", participant_id, state);
        })
    }));
}

struct RtcPeerTransport {
    participant_id: String,
    pc: Arc<RTCPeerConnection>,
}

#[async_trait::async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Transport(format!("create_offer failed: {e}")))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Transport(format!("set_local_description failed: {e}")))?;

        Ok(SessionDescription {
            kind: SdpType::Offer,
            sdp: offer.sdp,
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Transport(format!("create_answer failed: {e}")))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| Error::Transport(format!("set_local_description failed: {e}")))?;

        Ok(SessionDescription {
            kind: SdpType::Answer,
            sdp: answer.sdp,
        })
    }

    async fn apply_remote(&self, desc: &SessionDescription) -> Result<()> {
        let remote = match desc.kind {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
        }
        .map_err(|e| Error::Transport(format!("invalid remote description: {e}")))?;

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::Transport(format!("set_remote_description failed: {e}")))
    }

    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment.clone(),
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::Transport(format!("add_ice_candidate failed: {e}")))
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing connection to {}", self.participant_id);
        self.pc
            .close()
            .await
            .map_err(|e| Error::Transport(format!("close failed: {e}")))
    }
}

/// Writes microphone frames into the shared outbound track. Frames are
/// 16-bit PCM; each frame becomes one sample spanning its own duration.
async fn pump_audio(mut frames: mpsc::Receiver<AudioFrame>, track: Arc<TrackLocalStaticSample>) {
    while let Some(frame) = frames.recv().await {
        if frame.samples.is_empty() || frame.sample_rate == 0 || frame.channels == 0 {
            continue;
        }

        let mut data = Vec::with_capacity(frame.samples.len() * 2);
        for sample in &frame.samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }

        let frames_per_channel = frame.samples.len() as u64 / frame.channels as u64;
        let duration =
            Duration::from_micros(frames_per_channel * 1_000_000 / frame.sample_rate as u64);

        let sample = Sample {
            data: Bytes::from(data),
            duration,
            ..Default::default()
        };

        if let Err(e) = track.write_sample(&sample).await {
            debug!("Dropped outbound audio sample: {}", e);
        }
    }
}
