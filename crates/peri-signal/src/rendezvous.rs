//! The rendezvous state machine
//!
//! Both roles drive the same machine over a [`ResourceStore`]: the
//! responder posts an offer and waits for the answer notification; the
//! initiator waits for the offer, posts the answer, and waits for the
//! responder to confirm. All waiting is polling with a fixed interval and a
//! bounded attempt budget. During rendezvous the only path between the two
//! ends is the narrow asynchronous management channel, so there is nothing
//! to push events over, and the budget bounds how long an operator waits
//! for a device that may simply be offline.

use std::str;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use peri_protocol::chunk::{self, ChunkError, CHUNK_CAPACITY};
use peri_protocol::{RendezvousStatus, ResourcePath, SignalingLayout};

use crate::store::{ResourceStore, StoreError};

/// Notify value the initiator writes once the answer chunks are in place.
pub const NOTIFY_DONE: &str = "done";

/// Fixed interval and bounded attempts for one polling phase.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Polling budgets for the waiting phases.
#[derive(Debug, Clone, Copy)]
pub struct RendezvousTiming {
    /// Initiator waiting for the offer to be posted.
    pub offer_wait: PollPolicy,
    /// Initiator waiting for the responder to confirm the answer.
    pub completion_wait: PollPolicy,
    /// Responder waiting for the answer notification. Longer than the
    /// initiator budgets: the operator may still be typing credentials.
    pub answer_wait: PollPolicy,
}

impl Default for RendezvousTiming {
    fn default() -> Self {
        Self {
            offer_wait: PollPolicy::new(Duration::from_secs(1), 60),
            completion_wait: PollPolicy::new(Duration::from_secs(1), 60),
            answer_wait: PollPolicy::new(Duration::from_secs(1), 120),
        }
    }
}

/// The waiting phase a timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitOffer,
    AwaitCompletion,
    AwaitAnswer,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::AwaitOffer => write!(f, "offer-wait"),
            Phase::AwaitCompletion => write!(f, "completion-wait"),
            Phase::AwaitAnswer => write!(f, "answer-wait"),
        }
    }
}

/// Rendezvous errors.
#[derive(Error, Debug)]
pub enum SignalError {
    /// A waiting phase exhausted its poll budget.
    #[error("timed out in {phase} after {attempts} polls")]
    Timeout { phase: Phase, attempts: u32 },

    /// The responder could not reset the slots to the idle baseline. A
    /// partial clear would let the initiator read a stale handshake, so the
    /// handshake must not start.
    #[error("failed to reset signaling resources: {0}")]
    ClearFailed(StoreError),

    /// The status slot moved backwards within one session.
    #[error("signaling status went backwards ({from} -> {to})")]
    StatusRegression {
        from: RendezvousStatus,
        to: RendezvousStatus,
    },

    /// A description chunk was not valid UTF-8 and cannot be slotted.
    #[error("description is not valid UTF-8 at a chunk boundary")]
    InvalidDescription,

    /// The description does not fit the slot set.
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// A non-polling store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which description a slot set carries.
#[derive(Debug, Clone, Copy)]
enum DescriptionKind {
    Offer,
    Answer,
}

/// The rendezvous machine. One instance per handshake attempt; the phase
/// methods are grouped by role below.
pub struct Rendezvous<S> {
    store: S,
    layout: SignalingLayout,
    timing: RendezvousTiming,
    /// Highest status observed this session; used to reject regression.
    high_water: RendezvousStatus,
}

impl<S: ResourceStore> Rendezvous<S> {
    pub fn new(store: S) -> Self {
        Self::with_timing(store, RendezvousTiming::default())
    }

    pub fn with_timing(store: S, timing: RendezvousTiming) -> Self {
        Self {
            store,
            layout: SignalingLayout::default(),
            timing,
            high_water: RendezvousStatus::Idle,
        }
    }

    /// The slot layout this machine signals over.
    pub fn layout(&self) -> &SignalingLayout {
        &self.layout
    }

    // ---- initiator phases ----

    /// Wait for the responder to post its offer, then read it back.
    pub async fn await_offer(&mut self) -> Result<Vec<u8>, SignalError> {
        self.await_status(
            RendezvousStatus::OfferPosted,
            Phase::AwaitOffer,
            self.timing.offer_wait,
        )
        .await?;
        self.fetch_description(DescriptionKind::Offer).await
    }

    /// Post the local answer and raise the notification the responder
    /// polls for.
    pub async fn post_answer(&mut self, answer: &[u8]) -> Result<(), SignalError> {
        self.write_description(DescriptionKind::Answer, answer)
            .await?;
        self.store.write(self.layout.notify(), NOTIFY_DONE).await?;
        tracing::debug!("answer posted and notified");
        Ok(())
    }

    /// Wait for the responder to confirm it has applied the answer.
    pub async fn await_completion(&mut self) -> Result<(), SignalError> {
        self.await_status(
            RendezvousStatus::AnswerPosted,
            Phase::AwaitCompletion,
            self.timing.completion_wait,
        )
        .await
    }

    // ---- responder phases ----

    /// Clear every signaling slot to its idle baseline. Must fully succeed
    /// before an offer goes out.
    pub async fn reset(&mut self) -> Result<(), SignalError> {
        for (slot, value) in self.layout.baseline() {
            self.store
                .write(slot, value)
                .await
                .map_err(SignalError::ClearFailed)?;
        }
        self.high_water = RendezvousStatus::Idle;
        tracing::debug!("signaling slots reset");
        Ok(())
    }

    /// Post the local offer and mark the status so the initiator sees it.
    pub async fn post_offer(&mut self, offer: &[u8]) -> Result<(), SignalError> {
        self.write_description(DescriptionKind::Offer, offer).await?;
        self.write_status(RendezvousStatus::OfferPosted).await?;
        tracing::debug!("offer posted");
        Ok(())
    }

    /// Wait for the answer notification, then read the answer back.
    pub async fn await_answer(&mut self) -> Result<Vec<u8>, SignalError> {
        let policy = self.timing.answer_wait;
        let notify = self.layout.notify();
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            match self.store.read(notify).await {
                Ok(value) if value.as_text().map(str::trim) == Some(NOTIFY_DONE) => {
                    tracing::debug!(attempt, "answer notification received");
                    return self.fetch_description(DescriptionKind::Answer).await;
                }
                Ok(_) => {}
                // Transient failures ride on the phase budget; there is no
                // per-request retry.
                Err(err) => tracing::debug!(attempt, error = %err, "notify read failed"),
            }
        }
        Err(SignalError::Timeout {
            phase: Phase::AwaitAnswer,
            attempts: policy.max_attempts,
        })
    }

    /// Record that the answer has been applied; the final status
    /// transition of the handshake.
    pub async fn complete(&mut self) -> Result<(), SignalError> {
        self.write_status(RendezvousStatus::AnswerPosted).await?;
        tracing::debug!("rendezvous complete");
        Ok(())
    }

    // ---- shared machinery ----

    async fn await_status(
        &mut self,
        target: RendezvousStatus,
        phase: Phase,
        policy: PollPolicy,
    ) -> Result<(), SignalError> {
        let slot = self.layout.status();
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            match self.store.read(slot).await {
                Ok(value) => {
                    let Some(observed) = value.as_int().and_then(RendezvousStatus::from_value)
                    else {
                        continue;
                    };
                    if !observed.follows(self.high_water) {
                        return Err(SignalError::StatusRegression {
                            from: self.high_water,
                            to: observed,
                        });
                    }
                    self.high_water = observed;
                    if observed >= target {
                        tracing::debug!(status = %observed, attempt, "status reached");
                        return Ok(());
                    }
                }
                Err(err) => tracing::debug!(attempt, error = %err, "status read failed"),
            }
        }
        Err(SignalError::Timeout {
            phase,
            attempts: policy.max_attempts,
        })
    }

    async fn write_status(&mut self, status: RendezvousStatus) -> Result<(), SignalError> {
        self.store
            .write(self.layout.status(), &status.value().to_string())
            .await?;
        self.high_water = status;
        Ok(())
    }

    /// Write a description across its chunk slots in ascending order,
    /// terminator included so stale data in the boundary slot is cleared.
    async fn write_description(
        &self,
        kind: DescriptionKind,
        payload: &[u8],
    ) -> Result<(), SignalError> {
        let chunks = chunk::encode(payload)?;
        for (index, piece) in chunks.iter().enumerate() {
            let text = str::from_utf8(piece).map_err(|_| SignalError::InvalidDescription)?;
            self.store
                .write(self.description_slot(kind, index), text)
                .await?;
        }
        Ok(())
    }

    /// Read a description back, stopping at the first short chunk. A slot
    /// the writer never reached reads as end-of-message.
    async fn fetch_description(&self, kind: DescriptionKind) -> Result<Vec<u8>, SignalError> {
        let mut chunks: Vec<Bytes> = Vec::new();
        for index in 0..self.layout.chunk_slots() {
            match self.store.read(self.description_slot(kind, index)).await {
                Ok(value) => {
                    let piece = Bytes::from(value.into_text().into_bytes());
                    let last = piece.len() < CHUNK_CAPACITY;
                    chunks.push(piece);
                    if last {
                        break;
                    }
                }
                Err(StoreError::NotFound(_)) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(chunk::decode(chunks))
    }

    fn description_slot(&self, kind: DescriptionKind, index: usize) -> ResourcePath {
        match kind {
            DescriptionKind::Offer => self.layout.offer_chunk(index),
            DescriptionKind::Answer => self.layout.answer_chunk(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResourceValue;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::time::Instant;

    /// Shared in-memory slot map, with optional scripting of the status
    /// slot and write failures.
    #[derive(Default)]
    struct MemoryInner {
        slots: HashMap<ResourcePath, String>,
        /// Scripted status values returned before the real slot value.
        status_script: Vec<String>,
        fail_writes: bool,
    }

    #[derive(Clone, Default)]
    struct MemoryStore {
        inner: Arc<Mutex<MemoryInner>>,
        status_reads: Arc<AtomicU32>,
    }

    impl MemoryStore {
        fn set(&self, slot: ResourcePath, value: &str) {
            self.inner
                .lock()
                .unwrap()
                .slots
                .insert(slot, value.to_string());
        }

        fn get(&self, slot: ResourcePath) -> Option<String> {
            self.inner.lock().unwrap().slots.get(&slot).cloned()
        }

        fn script_status(&self, values: &[&str]) {
            let mut inner = self.inner.lock().unwrap();
            inner.status_script = values.iter().rev().map(|v| v.to_string()).collect();
        }

        fn fail_writes(&self) {
            self.inner.lock().unwrap().fail_writes = true;
        }
    }

    #[async_trait]
    impl ResourceStore for MemoryStore {
        async fn read(&self, slot: ResourcePath) -> Result<ResourceValue, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if slot == SignalingLayout::default().status() {
                self.status_reads.fetch_add(1, Ordering::SeqCst);
                if let Some(scripted) = inner.status_script.pop() {
                    return Ok(ResourceValue::Text(scripted));
                }
            }
            match inner.slots.get(&slot) {
                Some(value) => Ok(ResourceValue::Text(value.clone())),
                None => Err(StoreError::NotFound(slot)),
            }
        }

        async fn write(&self, slot: ResourcePath, value: &str) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_writes {
                return Err(StoreError::WriteFailed {
                    slot,
                    message: "injected failure".to_string(),
                });
            }
            inner.slots.insert(slot, value.to_string());
            Ok(())
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (b'a' + (i % 26) as u8)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_offer_succeeds_after_tenth_poll() {
        let store = MemoryStore::default();
        let layout = SignalingLayout::default();
        // Nine idle reads before the offer shows up.
        store.script_status(&["0", "0", "0", "0", "0", "0", "0", "0", "0"]);
        store.set(layout.status(), "1");
        store.set(layout.offer_chunk(0), "offer-sdp");

        let started = Instant::now();
        let mut rendezvous = Rendezvous::new(store.clone());
        let offer = rendezvous.await_offer().await.unwrap();

        assert_eq!(offer, b"offer-sdp");
        assert_eq!(store.status_reads.load(Ordering::SeqCst), 10);
        // One-second spacing before every poll, including the first.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_offer_times_out_after_exactly_sixty_attempts() {
        let store = MemoryStore::default();
        store.set(SignalingLayout::default().status(), "0");

        let started = Instant::now();
        let mut rendezvous = Rendezvous::new(store.clone());
        let err = rendezvous.await_offer().await.unwrap_err();

        match err {
            SignalError::Timeout { phase, attempts } => {
                assert_eq!(phase, Phase::AwaitOffer);
                assert_eq!(attempts, 60);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.status_reads.load(Ordering::SeqCst), 60);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_regression_is_rejected() {
        let store = MemoryStore::default();
        store.script_status(&["1", "0"]);
        store.set(SignalingLayout::default().status(), "0");

        let mut rendezvous = Rendezvous::new(store);
        let err = rendezvous.await_completion().await.unwrap_err();

        assert!(matches!(
            err,
            SignalError::StatusRegression {
                from: RendezvousStatus::OfferPosted,
                to: RendezvousStatus::Idle,
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_tolerates_missing_slot_until_budget() {
        // No status slot at all: every read fails, and the phase still
        // times out rather than erroring early.
        let store = MemoryStore::default();
        let mut rendezvous = Rendezvous::new(store);
        let err = rendezvous.await_completion().await.unwrap_err();
        assert!(matches!(
            err,
            SignalError::Timeout {
                phase: Phase::AwaitCompletion,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reset_failure_aborts() {
        let store = MemoryStore::default();
        store.fail_writes();

        let mut rendezvous = Rendezvous::new(store);
        let err = rendezvous.reset().await.unwrap_err();
        assert!(matches!(err, SignalError::ClearFailed(_)));
    }

    #[tokio::test]
    async fn test_reset_clears_stale_handshake() {
        let store = MemoryStore::default();
        let layout = SignalingLayout::default();
        store.set(layout.offer_chunk(0), "stale-offer");
        store.set(layout.status(), "2");
        store.set(layout.notify(), "done");

        let mut rendezvous = Rendezvous::new(store.clone());
        rendezvous.reset().await.unwrap();

        assert_eq!(store.get(layout.offer_chunk(0)).as_deref(), Some(""));
        assert_eq!(store.get(layout.status()).as_deref(), Some("0"));
        assert_eq!(store.get(layout.notify()).as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_handshake_roundtrip() {
        // Responder and initiator share one store, as they would share the
        // management tree. A 2500-byte offer crosses as 800/800/800/100.
        let store = MemoryStore::default();
        let layout = SignalingLayout::default();
        let offer = payload(2500);
        let answer = payload(950);

        let mut responder = Rendezvous::new(store.clone());
        let mut initiator = Rendezvous::new(store.clone());

        responder.reset().await.unwrap();
        responder.post_offer(&offer).await.unwrap();
        assert_eq!(store.get(layout.offer_chunk(0)).unwrap().len(), 800);
        assert_eq!(store.get(layout.offer_chunk(3)).unwrap().len(), 100);

        let received_offer = initiator.await_offer().await.unwrap();
        assert_eq!(received_offer, offer);

        initiator.post_answer(&answer).await.unwrap();
        let received_answer = responder.await_answer().await.unwrap();
        assert_eq!(received_answer, answer);

        responder.complete().await.unwrap();
        initiator.await_completion().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_ignores_stale_tail_after_short_chunk() {
        let store = MemoryStore::default();
        let layout = SignalingLayout::default();

        // A short fresh offer, with a stale chunk left in slot 1 by an
        // earlier, longer handshake.
        store.set(layout.status(), "1");
        store.set(layout.offer_chunk(0), "fresh");
        store.set(layout.offer_chunk(1), "stale-tail");

        let mut initiator = Rendezvous::new(store);
        let offer = initiator.await_offer().await.unwrap();
        assert_eq!(offer, b"fresh");
    }
}
