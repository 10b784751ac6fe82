pub mod connection;
pub mod ice;
pub mod media;
pub mod rtc;
pub mod state;
pub mod transport;
pub mod types;

pub use connection::{PeerConnectionManager, PeerEvent, PeerInput};
pub use media::{
    LocalStream, LocalTrack, MediaError, MediaSource, NoMedia, RemoteStream, TrackKind,
};
pub use rtc::{RtcTransport, RtcTransportFactory};
pub use state::{SessionEvent, SessionState, SessionStatus};
pub use transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
pub use types::{CallRecord, Candidate, Role, SdpKind, ServerConfig, SessionDescription};
