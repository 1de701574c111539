//! peri-session: The live half of a periscope session
//!
//! Everything after rendezvous lives here: the narrow seam over the peer
//! transport, the WebRTC provider behind it, the session supervisor that
//! enforces liveness, and the two terminal bridges (operator terminal on
//! the initiator side, PTY-attached shell on the responder side).

pub mod bridge;
pub mod channel;
pub mod provider;
pub mod session;

pub use channel::{ChannelError, ChannelEvent, PeerChannel};
pub use provider::{DataLink, PeerEndpoint};
pub use session::{
    CloseReason, PeerSession, SessionError, SessionMonitor, SessionState, SessionTiming,
};
