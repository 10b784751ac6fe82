pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod store;
pub mod utils;

pub use config::CallConfig;
pub use error::{Result, SignalError};
pub use peer::{
    CallRecord, Candidate, LocalStream, LocalTrack, MediaError, MediaSource, NoMedia,
    PeerConnectionManager, PeerEvent, PeerInput, RemoteStream, Role, RtcTransportFactory,
    SdpKind, ServerConfig, SessionDescription, SessionEvent, SessionState, SessionStatus,
    TrackKind, Transport, TransportEvent, TransportEvents, TransportFactory,
};
pub use session::{CallContext, CallSession};
pub use signaling::{CandidateRelay, SessionExchange, TeardownCoordinator};
pub use store::{
    ChangeKind, CollectionPath, DocChange, DocPath, Document, DocumentStore, MemoryStore,
    Snapshot, Subscription,
};
