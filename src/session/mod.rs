pub mod coordinator;
pub mod media;
pub mod peer;
pub mod rtc;
pub mod streams;
pub mod transport;

pub use coordinator::{CoordinatorConfig, SessionCoordinator, SessionEvent};
pub use media::{CpalMediaProvider, LocalMedia, MediaConstraints, MediaProvider};
pub use peer::ConnectionState;
pub use rtc::WebRtcTransportFactory;
pub use streams::{RemoteStream, StreamRegistry};
pub use transport::{MediaKind, PeerTransport, TransportEvent, TransportFactory};
