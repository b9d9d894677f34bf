use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::channel::SignalingChannel;
use super::messages::{ClientEvent, ServerEvent};
use crate::error::{Error, Result};

/// NATS-backed signaling relay. Topic is the meeting id: broadcast events
/// arrive on `meeting.events.<id>`, directed SDP/ICE relays on
/// `meeting.signal.<id>.<participant>`.
pub struct NatsSignaling {
    client: async_nats::Client,
    meeting_id: String,
    participant_id: String,
}

impl NatsSignaling {
    pub async fn connect(url: &str, meeting_id: String, participant_id: String) -> Result<Self> {
        info!("Connecting to signaling relay at {}", url);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| Error::Signaling(format!("failed to connect to {}: {}", url, e)))?;

        info!("Connected to signaling relay");

        Ok(Self {
            client,
            meeting_id,
            participant_id,
        })
    }

    fn subject_for(&self, event: &ClientEvent) -> String {
        match event {
            ClientEvent::Signal { target, .. } => {
                format!("meeting.signal.{}.{}", self.meeting_id, target)
            }
            ClientEvent::Audio { .. } => format!("audio.segment.meeting-{}", self.meeting_id),
            _ => format!("meeting.control.{}", self.meeting_id),
        }
    }

    fn forward_subscription(
        mut subscriber: async_nats::Subscriber,
        tx: mpsc::Sender<ServerEvent>,
        subject: String,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<ServerEvent>(&msg.payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse signaling message on {}: {}", subject, e);
                    }
                }
            }
        });
    }
}

#[async_trait::async_trait]
impl SignalingChannel for NatsSignaling {
    async fn publish(&self, event: ClientEvent) -> Result<()> {
        let subject = self.subject_for(&event);
        let payload =
            serde_json::to_vec(&event).map_err(|e| Error::Signaling(e.to_string()))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| Error::Signaling(format!("publish to {} failed: {}", subject, e)))?;

        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ServerEvent>> {
        let events_subject = format!("meeting.events.{}", self.meeting_id);
        let signal_subject = format!(
            "meeting.signal.{}.{}",
            self.meeting_id, self.participant_id
        );

        let events_sub = self
            .client
            .subscribe(events_subject.clone())
            .await
            .map_err(|e| Error::Signaling(format!("subscribe {} failed: {}", events_subject, e)))?;
        let signal_sub = self
            .client
            .subscribe(signal_subject.clone())
            .await
            .map_err(|e| Error::Signaling(format!("subscribe {} failed: {}", signal_subject, e)))?;

        info!("Subscribed to {} and {}", events_subject, signal_subject);

        let (tx, rx) = mpsc::channel(100);
        Self::forward_subscription(events_sub, tx.clone(), events_subject);
        Self::forward_subscription(signal_sub, tx, signal_subject);

        Ok(rx)
    }
}
