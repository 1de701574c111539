//! Control sentinels on the peer channel
//!
//! Once the data channel is up, text messages are control traffic and
//! binary messages are opaque terminal payload. Two sentinels exist: the
//! periodic keep-alive that feeds the peer's watchdog, and the terminate
//! message that ends a session in an orderly way.

use bytes::Bytes;

/// Periodic liveness message.
pub const KEEP_ALIVE: &str = "Keep Alive";

/// Orderly end-of-session message.
pub const TERMINATE: &str = "terminate";

/// A channel message after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Liveness control traffic; resets the receive watchdog.
    KeepAlive,
    /// The peer is ending the session.
    Terminate,
    /// Opaque payload bytes for the terminal bridge.
    Payload(Bytes),
}

impl Inbound {
    /// Classify a channel message. Binary is payload; text is control
    /// traffic, where anything but the terminate sentinel counts as a
    /// keep-alive since any inbound message proves the peer is alive.
    pub fn classify(is_text: bool, data: Bytes) -> Inbound {
        if !is_text {
            return Inbound::Payload(data);
        }
        if data.as_ref() == TERMINATE.as_bytes() {
            Inbound::Terminate
        } else {
            Inbound::KeepAlive
        }
    }
}
