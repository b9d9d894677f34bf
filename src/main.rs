use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use huddle_client::session::{
    CoordinatorConfig, CpalMediaProvider, MediaConstraints, SessionCoordinator, SessionEvent,
    WebRtcTransportFactory,
};
use huddle_client::signaling::NatsSignaling;
use huddle_client::vad::SegmenterConfig;
use huddle_client::{AudioBackendConfig, Config};

#[derive(Parser, Debug)]
#[command(name = "huddle-client", about = "Join a meeting from the terminal")]
struct Cli {
    /// Meeting to join
    meeting_id: String,

    /// Config file (without extension)
    #[arg(long, default_value = "config/huddle-client")]
    config: String,

    /// Override the signaling relay URL
    #[arg(long)]
    signaling_url: Option<String>,

    /// Participant id; a random one is generated when omitted
    #[arg(long)]
    user_id: Option<String>,

    /// Join with the microphone muted
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config {} not loaded ({}), using defaults", cli.config, e);
            Config::default()
        }
    };

    let url = cli
        .signaling_url
        .unwrap_or_else(|| cfg.signaling.url.clone());
    let participant_id = cli
        .user_id
        .unwrap_or_else(|| format!("user-{}", uuid::Uuid::new_v4()));

    info!("huddle-client v{}", env!("CARGO_PKG_VERSION"));
    info!("Relay: {}", url);

    let signaling = Arc::new(
        NatsSignaling::connect(&url, cli.meeting_id.clone(), participant_id.clone()).await?,
    );
    let transports = Arc::new(WebRtcTransportFactory::new()?);
    let media_provider = CpalMediaProvider;

    let coordinator_config = CoordinatorConfig {
        meeting_id: cli.meeting_id.clone(),
        participant_id,
        flags: cfg.session.clone(),
        vad: SegmenterConfig {
            threshold_db: cfg.vad.threshold_db,
            silence: Duration::from_millis(cfg.vad.silence_duration_ms),
        },
        media: MediaConstraints {
            echo_cancellation: cfg.audio.echo_cancellation,
            noise_suppression: cfg.audio.noise_suppression,
            audio: AudioBackendConfig {
                target_sample_rate: cfg.audio.sample_rate,
                target_channels: cfg.audio.channels,
                buffer_duration_ms: cfg.audio.buffer_duration_ms,
            },
        },
    };

    let coordinator =
        SessionCoordinator::join(coordinator_config, signaling, transports, &media_provider)
            .await?;

    if cli.muted && !coordinator.is_muted() {
        coordinator.toggle_mute().await?;
    }

    info!(
        "In meeting {} as {} (Ctrl-C to leave)",
        coordinator.meeting_id(),
        coordinator.participant_id()
    );

    let mut events = coordinator.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::RemoteStreamAdded { participant_id }) => {
                    info!("Media from {}", participant_id);
                }
                Ok(SessionEvent::RemoteStreamRemoved { participant_id }) => {
                    info!("{} left", participant_id);
                }
                Ok(SessionEvent::SpeakingChanged { participant_id, talking }) => {
                    if talking {
                        info!("{} is talking", participant_id);
                    }
                }
                Ok(SessionEvent::Transcription { time_stamp, participant_id, sentence }) => {
                    info!("[{}] {}: {}", time_stamp, participant_id, sentence);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} session events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    coordinator.leave().await?;
    info!("Goodbye");
    Ok(())
}
