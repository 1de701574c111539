//! The seam between the session supervisor and the transport provider
//!
//! The supervisor never touches the transport directly: it writes through
//! [`PeerChannel`] and consumes [`ChannelEvent`]s from a bounded queue the
//! provider fills. That keeps transport callbacks out of session state and
//! lets tests drive a session with a mock channel.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by a peer-channel write.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel is not open (yet, or any more).
    #[error("peer channel is not open")]
    NotOpen,

    /// The transport rejected the write.
    #[error("peer channel write failed: {0}")]
    Send(String),
}

/// Write half of a peer channel.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Send opaque payload bytes as a binary message.
    async fn send_payload(&self, data: Bytes) -> Result<(), ChannelError>;

    /// Send a control sentinel as a text message.
    async fn send_control(&self, text: &str) -> Result<(), ChannelError>;
}

/// Events produced by the transport provider for one channel.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The channel reached the open state.
    Open,
    /// A text message arrived.
    Text(String),
    /// A binary message arrived.
    Binary(Bytes),
}
