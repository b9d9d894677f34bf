pub mod channel;
pub mod messages;
pub mod nats;

pub use channel::SignalingChannel;
pub use messages::{ClientEvent, IceCandidate, SdpType, ServerEvent, SessionDescription};
pub use nats::NatsSignaling;
