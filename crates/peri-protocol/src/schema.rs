//! Signaling resource layout
//!
//! The rendezvous rides on one object of the device-management resource
//! tree. Both store adapters receive this layout as a value, which keeps the
//! numeric object/instance/resource ids in a single place instead of
//! scattered through the call sites.

use std::fmt;

use crate::chunk::MAX_CHUNKS;

/// Object id of the signaling object in the device resource tree.
pub const SIGNALING_OBJECT_ID: u16 = 9;

/// Resource ids inside the signaling object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SignalResource {
    /// One chunk of the offer description (one per instance).
    OfferChunk = 0,
    /// One chunk of the answer description (one per instance).
    AnswerChunk = 3,
    /// Executable: start a responder session on the device.
    StartSession = 4,
    /// Executable: stop a running responder session.
    StopSession = 6,
    /// Rendezvous status, instance 0 only.
    Status = 7,
    /// Answer-posted notification, instance 0 only.
    Notify = 14,
}

impl SignalResource {
    /// Numeric resource id.
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Address of a single resource slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    pub object_id: u16,
    pub instance_id: u16,
    pub resource_id: u16,
}

impl ResourcePath {
    /// Create a new resource path.
    pub fn new(object_id: u16, instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id,
            instance_id,
            resource_id,
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.object_id, self.instance_id, self.resource_id
        )
    }
}

/// The slots one handshake occupies: chunk slots per instance, plus the
/// status and notify fields on instance 0.
#[derive(Debug, Clone)]
pub struct SignalingLayout {
    object_id: u16,
    chunk_slots: u16,
}

impl SignalingLayout {
    /// Layout of the standard signaling object.
    pub fn new() -> Self {
        Self {
            object_id: SIGNALING_OBJECT_ID,
            chunk_slots: MAX_CHUNKS as u16,
        }
    }

    /// Number of chunk-bearing instances.
    pub fn chunk_slots(&self) -> usize {
        self.chunk_slots as usize
    }

    /// Slot holding offer chunk `index`.
    pub fn offer_chunk(&self, index: usize) -> ResourcePath {
        ResourcePath::new(self.object_id, index as u16, SignalResource::OfferChunk.id())
    }

    /// Slot holding answer chunk `index`.
    pub fn answer_chunk(&self, index: usize) -> ResourcePath {
        ResourcePath::new(
            self.object_id,
            index as u16,
            SignalResource::AnswerChunk.id(),
        )
    }

    /// The rendezvous status field.
    pub fn status(&self) -> ResourcePath {
        ResourcePath::new(self.object_id, 0, SignalResource::Status.id())
    }

    /// The answer-posted notification field.
    pub fn notify(&self) -> ResourcePath {
        ResourcePath::new(self.object_id, 0, SignalResource::Notify.id())
    }

    /// The executable slot that starts a responder session.
    pub fn start_trigger(&self) -> ResourcePath {
        ResourcePath::new(self.object_id, 0, SignalResource::StartSession.id())
    }

    /// The executable slot that stops a running responder session.
    pub fn stop_trigger(&self) -> ResourcePath {
        ResourcePath::new(self.object_id, 0, SignalResource::StopSession.id())
    }

    /// Every slot a handshake touches, paired with its idle baseline value.
    /// The responder writes these before posting a fresh offer.
    pub fn baseline(&self) -> Vec<(ResourcePath, &'static str)> {
        let mut slots = Vec::with_capacity(self.chunk_slots() * 2 + 2);
        for index in 0..self.chunk_slots() {
            slots.push((self.offer_chunk(index), ""));
        }
        for index in 0..self.chunk_slots() {
            slots.push((self.answer_chunk(index), ""));
        }
        slots.push((self.status(), "0"));
        slots.push((self.notify(), ""));
        slots
    }
}

impl Default for SignalingLayout {
    fn default() -> Self {
        Self::new()
    }
}
