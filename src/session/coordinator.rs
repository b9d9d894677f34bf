//! Session coordination: one live transport per remote participant, local
//! media flowing into all of them, and the voice segmenter feeding the
//! signaling channel.

use base64::Engine;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::media::{LocalMedia, MediaConstraints, MediaProvider};
use super::peer::{self, ConnectionState, PeerCommand, PeerRecord};
use super::streams::{RemoteStream, StreamRegistry};
use super::transport::{TransportEvent, TransportFactory};
use crate::audio::{AudioFrame, SegmentEncoder};
use crate::config::SessionFlags;
use crate::error::{Error, Result};
use crate::signaling::{ClientEvent, ServerEvent, SignalingChannel};
use crate::vad::{SegmenterConfig, SegmenterEvent, VoiceSegmenter};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub meeting_id: String,
    /// This client's id on the signaling topic
    pub participant_id: String,
    pub flags: SessionFlags,
    pub vad: SegmenterConfig,
    pub media: MediaConstraints,
}

impl CoordinatorConfig {
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            participant_id: format!("user-{}", uuid::Uuid::new_v4()),
            flags: SessionFlags::default(),
            vad: SegmenterConfig::default(),
            media: MediaConstraints::default(),
        }
    }
}

/// UI-facing notifications.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RemoteStreamAdded { participant_id: String },
    RemoteStreamRemoved { participant_id: String },
    SpeakingChanged { participant_id: String, talking: bool },
    Transcription {
        time_stamp: String,
        participant_id: String,
        sentence: String,
    },
}

/// Owns every per-participant connection for the duration of one meeting.
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: CoordinatorConfig,
    signaling: Arc<dyn SignalingChannel>,
    transports: Arc<dyn TransportFactory>,

    joined: AtomicBool,
    peers: Mutex<HashMap<String, PeerRecord>>,
    streams: StdMutex<StreamRegistry>,
    talking: StdMutex<HashSet<String>>,

    media: Mutex<Option<LocalMedia>>,
    audio_enabled: Arc<AtomicBool>,

    segmenter: Mutex<Option<VoiceSegmenter>>,
    /// Set when the platform format proved unencodable; the recording
    /// feature stays off for the rest of the session, mute cycles included.
    recording_disabled: AtomicBool,
    /// Current segmenter input; replaced on every mute/unmute cycle
    vad_tx: StdMutex<Option<mpsc::Sender<AudioFrame>>>,
    /// Long-lived segmenter output; taking it on leave ends the forwarder
    vad_events_tx: StdMutex<Option<mpsc::Sender<SegmenterEvent>>>,

    transport_events_tx: mpsc::Sender<TransportEvent>,
    session_events: broadcast::Sender<SessionEvent>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// Acquire local media, start the segmenter, register signaling
    /// listeners, and announce presence on the meeting topic.
    ///
    /// [`Error::MediaAcquisition`] aborts the join before any signaling.
    /// An unsupported segment format disables voice capture but the join
    /// proceeds.
    pub async fn join(
        config: CoordinatorConfig,
        signaling: Arc<dyn SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
        media_provider: &dyn MediaProvider,
    ) -> Result<Self> {
        info!(
            "Joining meeting {} as {}",
            config.meeting_id, config.participant_id
        );

        let mut media = media_provider.acquire(&config.media).await?;
        let frames = media
            .take_frames()
            .ok_or_else(|| Error::MediaAcquisition("media stream already consumed".into()))?;
        let audio_enabled = media.audio_enabled();

        let (transport_events_tx, transport_events_rx) = mpsc::channel(64);
        let (vad_events_tx, vad_events_rx) = mpsc::channel(64);
        let (session_events, _) = broadcast::channel(64);
        let page_size = config.flags.stream_page_size;

        let inner = Arc::new(Inner {
            config,
            signaling: Arc::clone(&signaling),
            transports,
            joined: AtomicBool::new(true),
            peers: Mutex::new(HashMap::new()),
            streams: StdMutex::new(StreamRegistry::new(page_size)),
            talking: StdMutex::new(HashSet::new()),
            media: Mutex::new(Some(media)),
            audio_enabled,
            segmenter: Mutex::new(None),
            recording_disabled: AtomicBool::new(false),
            vad_tx: StdMutex::new(None),
            vad_events_tx: StdMutex::new(Some(vad_events_tx)),
            transport_events_tx,
            session_events,
            tasks: StdMutex::new(Vec::new()),
        });

        let coordinator = Self { inner };

        if coordinator.inner.config.flags.voice_segments {
            match coordinator.inner.start_segmenter().await {
                Ok(()) => {}
                Err(Error::UnsupportedFormat(e)) => {
                    // The meeting proceeds without voice capture for the
                    // rest of this session.
                    warn!("Voice segmenter disabled: {}", e);
                    coordinator
                        .inner
                        .recording_disabled
                        .store(true, Ordering::SeqCst);
                }
                Err(e) => return Err(e),
            }
        }

        let fanout = tokio::spawn(run_fanout(
            frames,
            Arc::clone(&coordinator.inner),
            coordinator.inner.transports.local_audio_sink(),
        ));

        let forwarder = tokio::spawn(forward_segmenter_events(
            vad_events_rx,
            Arc::clone(&coordinator.inner),
        ));

        let server_rx = signaling.subscribe().await?;
        let dispatch = tokio::spawn(run_dispatch(
            Arc::clone(&coordinator.inner),
            server_rx,
            transport_events_rx,
        ));

        {
            let mut tasks = coordinator.inner.tasks.lock().unwrap();
            tasks.push(fanout);
            tasks.push(dispatch);
        }
        // The forwarder exits on its own once the segmenter channel closes.
        drop(forwarder);

        coordinator
            .inner
            .signaling
            .publish(ClientEvent::JoinMeeting {
                meeting_id: coordinator.inner.config.meeting_id.clone(),
            })
            .await?;

        info!("Joined meeting {}", coordinator.inner.config.meeting_id);
        Ok(coordinator)
    }

    /// Announce departure, tear everything down, release local media.
    /// Idempotent: a second call is a no-op.
    pub async fn leave(&self) -> Result<()> {
        if !self.inner.joined.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Leaving meeting {}", self.inner.config.meeting_id);

        if let Err(e) = self
            .inner
            .signaling
            .publish(ClientEvent::LeaveMeeting {
                meeting_id: self.inner.config.meeting_id.clone(),
            })
            .await
        {
            warn!("Failed to announce departure: {}", e);
        }

        self.inner.stop_segmenter().await;
        // Closing the segmenter event channel lets the forwarder drain its
        // final not-talking publish and exit.
        self.inner.vad_events_tx.lock().unwrap().take();

        // Detach listeners before releasing shared resources so no late
        // callback touches torn-down state.
        for task in self.inner.tasks.lock().unwrap().drain(..) {
            task.abort();
        }

        // Each closure is attempted independently.
        let peers: Vec<(String, PeerRecord)> =
            self.inner.peers.lock().await.drain().collect();
        for (participant_id, record) in peers {
            if let Err(e) = record.transport.close().await {
                warn!("Failed to close connection to {}: {}", participant_id, e);
            }
            record.worker.abort();
        }

        self.inner.streams.lock().unwrap().clear();
        self.inner.talking.lock().unwrap().clear();

        if let Some(media) = self.inner.media.lock().await.take() {
            media.release().await;
        }

        info!("Left meeting {}", self.inner.config.meeting_id);
        Ok(())
    }

    /// Flip the microphone in place. Unmuting restarts the segmenter;
    /// muting stops it (which signals not-talking). Returns the new muted
    /// state. No connections are created or destroyed.
    pub async fn toggle_mute(&self) -> Result<bool> {
        // Compute the target state first, then apply it.
        let enable = !self.inner.audio_enabled.load(Ordering::SeqCst);

        if enable {
            self.inner.audio_enabled.store(true, Ordering::SeqCst);
            if self.inner.config.flags.voice_segments
                && !self.inner.recording_disabled.load(Ordering::SeqCst)
            {
                match self.inner.start_segmenter().await {
                    Ok(()) => {}
                    Err(Error::UnsupportedFormat(e)) => {
                        warn!("Voice segmenter unavailable after unmute: {}", e);
                        self.inner.recording_disabled.store(true, Ordering::SeqCst);
                    }
                    Err(e) => return Err(e),
                }
            }
        } else {
            self.inner.stop_segmenter().await;
            self.inner.audio_enabled.store(false, Ordering::SeqCst);
        }

        info!("Microphone {}", if enable { "unmuted" } else { "muted" });
        Ok(!enable)
    }

    pub fn is_muted(&self) -> bool {
        !self.inner.audio_enabled.load(Ordering::SeqCst)
    }

    pub fn meeting_id(&self) -> &str {
        &self.inner.config.meeting_id
    }

    pub fn participant_id(&self) -> &str {
        &self.inner.config.participant_id
    }

    /// Subscribe to UI-facing session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session_events.subscribe()
    }

    pub async fn connection_state(&self, participant_id: &str) -> Option<ConnectionState> {
        self.inner
            .peers
            .lock()
            .await
            .get(participant_id)
            .map(|record| record.state)
    }

    pub async fn participant_count(&self) -> usize {
        self.inner.peers.lock().await.len()
    }

    /// Remote streams in the current visible window.
    pub fn visible_streams(&self) -> Vec<RemoteStream> {
        self.inner.streams.lock().unwrap().visible()
    }

    pub fn page_left(&self) {
        self.inner.streams.lock().unwrap().page_left();
    }

    pub fn page_right(&self) {
        self.inner.streams.lock().unwrap().page_right();
    }

    /// Participants currently showing a speaking indicator.
    pub fn talking_participants(&self) -> Vec<String> {
        let talking = self.inner.talking.lock().unwrap();
        talking.iter().cloned().collect()
    }

    pub async fn is_segmenter_armed(&self) -> bool {
        self.inner
            .segmenter
            .lock()
            .await
            .as_ref()
            .map(|s| s.is_armed())
            .unwrap_or(false)
    }
}

impl Inner {
    async fn start_segmenter(&self) -> Result<()> {
        let encoder = SegmentEncoder::new(
            self.config.media.audio.target_sample_rate,
            self.config.media.audio.target_channels,
        )?;

        let events_tx = self
            .vad_events_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::UnsupportedFormat("segmenter channel closed".into()))?;

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let segmenter =
            VoiceSegmenter::start(self.config.vad.clone(), encoder, frame_rx, events_tx);

        *self.vad_tx.lock().unwrap() = Some(frame_tx);
        *self.segmenter.lock().await = Some(segmenter);
        Ok(())
    }

    async fn stop_segmenter(&self) {
        self.vad_tx.lock().unwrap().take();
        if let Some(mut segmenter) = self.segmenter.lock().await.take() {
            segmenter.stop().await;
        }
    }

    /// Look up or lazily create the connection record for a participant.
    /// The registry lock is held across creation, so a re-entrant call for
    /// the same id finds the record already present and no-ops.
    async fn ensure_peer(&self, participant_id: &str, initiate_offer: bool) {
        let mut peers = self.peers.lock().await;

        if !peers.contains_key(participant_id) {
            let transport = match self
                .transports
                .create(participant_id, self.transport_events_tx.clone())
                .await
            {
                Ok(transport) => transport,
                Err(e) => {
                    warn!("Failed to create transport for {}: {}", participant_id, e);
                    return;
                }
            };

            let (commands_tx, commands_rx) = mpsc::unbounded_channel();
            let worker = peer::spawn_worker(
                participant_id.to_string(),
                Arc::clone(&transport),
                Arc::clone(&self.signaling),
                commands_rx,
            );

            peers.insert(
                participant_id.to_string(),
                PeerRecord {
                    state: ConnectionState::Negotiating,
                    transport,
                    commands: commands_tx,
                    worker,
                },
            );

            if initiate_offer {
                if let Some(record) = peers.get(participant_id) {
                    let _ = record.commands.send(PeerCommand::Offer);
                }
            }
        }
        // A second join notification for a known participant is a no-op.
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::UserJoined { user_id } => {
                if user_id == self.config.participant_id {
                    return;
                }
                info!("Participant joined: {}", user_id);
                // The existing side always initiates toward newcomers.
                self.ensure_peer(&user_id, true).await;
            }

            ServerEvent::Signal {
                sender,
                sdp,
                candidate,
            } => {
                // First inbound signal from an unknown sender creates the
                // handle lazily (the newcomer receiving the first offer).
                self.ensure_peer(&sender, false).await;

                let peers = self.peers.lock().await;
                let Some(record) = peers.get(&sender) else {
                    return;
                };

                if let Some(sdp) = sdp {
                    let _ = record.commands.send(PeerCommand::Remote(sdp));
                } else if let Some(candidate) = candidate {
                    let _ = record.commands.send(PeerCommand::Candidate(candidate));
                }
            }

            ServerEvent::UserLeft { user_id } => {
                info!("Participant left: {}", user_id);
                self.remove_peer(&user_id).await;
            }

            ServerEvent::UserTalking { user_id } => {
                self.set_talking(&user_id, true);
            }

            ServerEvent::UserNotTalking { user_id } => {
                self.set_talking(&user_id, false);
            }

            ServerEvent::Transcription {
                time_stamp,
                user_id,
                sentence,
            } => {
                let _ = self.session_events.send(SessionEvent::Transcription {
                    time_stamp,
                    participant_id: user_id,
                    sentence,
                });
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::RemoteMedia {
                participant_id,
                kind,
            } => {
                {
                    let mut peers = self.peers.lock().await;
                    if let Some(record) = peers.get_mut(&participant_id) {
                        if record.state == ConnectionState::Negotiating {
                            record.state = ConnectionState::Connected;
                            info!("Connected to {}", participant_id);
                        }
                    }
                }

                let added = self
                    .streams
                    .lock()
                    .unwrap()
                    .upsert(&participant_id, kind);
                if added {
                    let _ = self
                        .session_events
                        .send(SessionEvent::RemoteStreamAdded { participant_id });
                }
            }

            TransportEvent::Candidate {
                participant_id,
                candidate,
            } => {
                // Fire-and-forget relay; a dropped candidate degrades to a
                // stalled negotiation, never an error.
                let result = self
                    .signaling
                    .publish(ClientEvent::Signal {
                        target: participant_id.clone(),
                        sdp: None,
                        candidate: Some(candidate),
                    })
                    .await;
                if let Err(e) = result {
                    warn!("Failed to relay candidate to {}: {}", participant_id, e);
                }
            }
        }
    }

    async fn remove_peer(&self, participant_id: &str) {
        let record = self.peers.lock().await.remove(participant_id);
        if let Some(record) = record {
            if let Err(e) = record.transport.close().await {
                warn!("Failed to close connection to {}: {}", participant_id, e);
            }
            record.worker.abort();
        }

        let removed = self.streams.lock().unwrap().remove(participant_id);
        if removed {
            let _ = self.session_events.send(SessionEvent::RemoteStreamRemoved {
                participant_id: participant_id.to_string(),
            });
        }

        self.talking.lock().unwrap().remove(participant_id);
    }

    fn set_talking(&self, participant_id: &str, talking: bool) {
        if !self.config.flags.speaker_indicators {
            return;
        }

        let changed = {
            let mut set = self.talking.lock().unwrap();
            if talking {
                set.insert(participant_id.to_string())
            } else {
                set.remove(participant_id)
            }
        };

        if changed {
            let _ = self.session_events.send(SessionEvent::SpeakingChanged {
                participant_id: participant_id.to_string(),
                talking,
            });
        }
    }
}

/// Applies inbound signaling and transport events. Signaling arrives on one
/// ordered channel, so per-participant ordering is preserved end to end.
async fn run_dispatch(
    inner: Arc<Inner>,
    mut server_rx: mpsc::Receiver<ServerEvent>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            event = server_rx.recv() => match event {
                Some(event) => inner.handle_server_event(event).await,
                None => break,
            },
            event = transport_rx.recv() => match event {
                Some(event) => inner.handle_transport_event(event).await,
                None => break,
            },
        }
    }
}

/// Feeds microphone frames to the segmenter and the outbound media sink.
/// While muted, frames are read and discarded so capture never backs up.
async fn run_fanout(
    mut frames: mpsc::Receiver<AudioFrame>,
    inner: Arc<Inner>,
    sink: Option<mpsc::Sender<AudioFrame>>,
) {
    while let Some(frame) = frames.recv().await {
        if !inner.audio_enabled.load(Ordering::SeqCst) {
            continue;
        }

        if let Some(ref sink) = sink {
            let _ = sink.try_send(frame.clone());
        }

        let vad_tx = inner.vad_tx.lock().unwrap().clone();
        if let Some(vad_tx) = vad_tx {
            let _ = vad_tx.try_send(frame);
        }
    }
}

/// Translates segmenter output into signaling publishes: speaking-state
/// indicators and voice segment uploads.
async fn forward_segmenter_events(
    mut events: mpsc::Receiver<SegmenterEvent>,
    inner: Arc<Inner>,
) {
    while let Some(event) = events.recv().await {
        let meeting_id = inner.config.meeting_id.clone();
        let outbound = match event {
            SegmenterEvent::Talking => ClientEvent::UserTalking { meeting_id },
            SegmenterEvent::NotTalking => ClientEvent::UserNotTalking { meeting_id },
            SegmenterEvent::Segment(segment) => ClientEvent::Audio {
                audio: base64::engine::general_purpose::STANDARD.encode(&segment.data),
                meeting_id,
                timestamp: segment.captured_at.timestamp_millis(),
            },
        };

        if let Err(e) = inner.signaling.publish(outbound).await {
            warn!("Failed to publish segmenter event: {}", e);
        }
    }
}
