use tokio::sync::mpsc;

use super::messages::{ClientEvent, ServerEvent};
use crate::error::Result;

/// Out-of-band message relay used to exchange connection-setup metadata.
///
/// Injected into the coordinator so tests can supply a double instead of a
/// shared live connection.
#[async_trait::async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Publish an event to the meeting's topic. Delivery is fire-and-forget
    /// from the coordinator's point of view; callers log failures and move on.
    async fn publish(&self, event: ClientEvent) -> Result<()>;

    /// Subscribe to events addressed to this participant, in arrival order.
    async fn subscribe(&self) -> Result<mpsc::Receiver<ServerEvent>>;
}
