//! peri-protocol: Signaling schema and chunk codec for periscope
//!
//! This crate defines the resource layout used for rendezvous signaling,
//! the chunked encoding that carries handshake descriptions through the
//! fixed-capacity resource slots, and the control sentinels spoken on the
//! peer data channel once it is up.

pub mod chunk;
pub mod control;
pub mod schema;
pub mod status;

pub use chunk::{ChunkError, CHUNK_CAPACITY, MAX_CHUNKS, MAX_MESSAGE_SIZE};
pub use control::Inbound;
pub use schema::{ResourcePath, SignalingLayout, SIGNALING_OBJECT_ID};
pub use status::RendezvousStatus;
