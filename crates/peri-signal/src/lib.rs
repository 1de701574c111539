//! peri-signal: Rendezvous signaling for periscope
//!
//! The handshake between the two roles travels through a handful of
//! resource slots in the device-management tree. This crate provides the
//! uniform slot store (remote directory-API variant and local file
//! variant) and the polling state machine both roles run to drive the
//! handshake to completion.

pub mod rendezvous;
pub mod store;

pub use rendezvous::{Phase, PollPolicy, Rendezvous, RendezvousTiming, SignalError};
pub use store::{LocalStore, RemoteStore, ResourceStore, ResourceValue, StoreError};
