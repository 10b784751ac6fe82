pub mod exchange;
pub mod relay;
pub mod teardown;

pub use exchange::{RecordFeed, SessionExchange};
pub use relay::{CandidateFeed, CandidateRelay};
pub use teardown::{HangupFeed, TeardownCoordinator};
