//! Session supervision over an established peer channel
//!
//! Once the channel opens the supervisor runs two tasks: a heartbeat
//! emitter that keeps the peer's watchdog fed, and a dispatcher that
//! classifies inbound traffic, owns the receive watchdog, and hands payload
//! to the bridge. All termination funnels through one close cell so the
//! reason is recorded exactly once, whichever condition fires first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use peri_protocol::control::{self, Inbound};

use crate::channel::{ChannelEvent, PeerChannel};

/// Capacity of the payload queue between the dispatcher and the bridge.
const PAYLOAD_CHANNEL_CAPACITY: usize = 256;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A local shutdown signal or local bridge exit.
    LocalSignal,
    /// Nothing received within the watchdog deadline.
    LivenessTimeout,
    /// The peer sent the terminate sentinel or tore the channel down.
    PeerRequestedTermination,
    /// An outbound payload write was rejected by the channel.
    SendFailed,
    /// The channel never opened after rendezvous.
    OpenTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LocalSignal => write!(f, "local-signal"),
            CloseReason::LivenessTimeout => write!(f, "liveness-timeout"),
            CloseReason::PeerRequestedTermination => write!(f, "peer-requested-termination"),
            CloseReason::SendFailed => write!(f, "send-failed"),
            CloseReason::OpenTimeout => write!(f, "open-timeout"),
        }
    }
}

/// Lifecycle of a session. `Closing` and `Closed` are entered exactly once,
/// with the first recorded reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Open,
    Closing(CloseReason),
    Closed(CloseReason),
}

/// Timing knobs of the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Spacing of outbound keep-alives.
    pub heartbeat_interval: Duration,
    /// Rolling receive deadline; reset by any inbound message.
    pub liveness_timeout: Duration,
    /// How long to wait for the channel to open after rendezvous.
    pub open_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(15),
            open_timeout: Duration::from_secs(60),
        }
    }
}

/// Session errors surfaced to the bridges.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The peer channel did not open in time.
    #[error("peer channel did not open within {0:?}")]
    OpenTimeout(Duration),

    /// An outbound write was rejected; fatal to the session.
    #[error("failed to send on peer channel")]
    SendFailed,

    /// The session has already ended.
    #[error("session already closed ({0})")]
    Closed(CloseReason),
}

struct Shared {
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl Shared {
    /// Move to `Closing(reason)`. The first close wins; later reasons are
    /// dropped.
    fn begin_close(&self, reason: CloseReason) -> bool {
        let mut first = false;
        self.state.send_if_modified(|state| match *state {
            SessionState::Created | SessionState::Open => {
                *state = SessionState::Closing(reason);
                first = true;
                true
            }
            _ => false,
        });
        if first {
            tracing::info!(%reason, "session closing");
            self.cancel.cancel();
        }
        first
    }

    fn finish_close(&self) {
        self.state.send_if_modified(|state| {
            if let SessionState::Closing(reason) = *state {
                *state = SessionState::Closed(reason);
                true
            } else {
                false
            }
        });
    }
}

/// Watch handle resolving when the session ends.
#[derive(Clone)]
pub struct SessionMonitor {
    state: watch::Receiver<SessionState>,
}

impl SessionMonitor {
    /// Wait until the session leaves the open state; returns the reason.
    pub async fn closed(&mut self) -> CloseReason {
        loop {
            let current = *self.state.borrow();
            match current {
                SessionState::Closing(reason) | SessionState::Closed(reason) => return reason,
                _ => {}
            }
            if self.state.changed().await.is_err() {
                // Supervisor gone entirely; treat as a local teardown.
                return CloseReason::LocalSignal;
            }
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }
}

/// Supervisor of one established peer channel.
pub struct PeerSession {
    channel: Arc<dyn PeerChannel>,
    shared: Arc<Shared>,
    payload_rx: Option<mpsc::Receiver<Bytes>>,
}

impl PeerSession {
    /// Wait for the channel to open, then start supervision. Consumes the
    /// provider's event stream. The "open" event is observed exactly once;
    /// anything arriving before it is dropped, since the peer cannot
    /// meaningfully talk to us yet.
    pub async fn establish(
        channel: Arc<dyn PeerChannel>,
        mut events: mpsc::Receiver<ChannelEvent>,
        timing: SessionTiming,
    ) -> Result<PeerSession, SessionError> {
        let opened = time::timeout(timing.open_timeout, async {
            while let Some(event) = events.recv().await {
                if matches!(event, ChannelEvent::Open) {
                    return true;
                }
            }
            false
        })
        .await;

        match opened {
            Ok(true) => {}
            Ok(false) | Err(_) => return Err(SessionError::OpenTimeout(timing.open_timeout)),
        }

        let (state_tx, _) = watch::channel(SessionState::Open);
        let shared = Arc::new(Shared {
            state: state_tx,
            cancel: CancellationToken::new(),
        });
        let (payload_tx, payload_rx) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);

        tokio::spawn(heartbeat_loop(
            Arc::clone(&channel),
            Arc::clone(&shared),
            timing.heartbeat_interval,
        ));
        tokio::spawn(dispatch_loop(
            events,
            payload_tx,
            Arc::clone(&shared),
            timing.liveness_timeout,
        ));

        tracing::info!("peer channel open");
        Ok(PeerSession {
            channel,
            shared,
            payload_rx: Some(payload_rx),
        })
    }

    /// Receiver of inbound payload bytes. Takeable once, by the bridge.
    pub fn take_payloads(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.payload_rx.take()
    }

    /// A monitor resolving when the session ends.
    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor {
            state: self.shared.state.subscribe(),
        }
    }

    /// Forward payload to the peer. A rejected write is fatal to the
    /// session: the bridge must stop relaying once it sees the error.
    pub async fn send(&self, data: Bytes) -> Result<(), SessionError> {
        if let SessionState::Closing(reason) | SessionState::Closed(reason) =
            *self.shared.state.borrow()
        {
            return Err(SessionError::Closed(reason));
        }
        if let Err(err) = self.channel.send_payload(data).await {
            tracing::warn!(error = %err, "payload send failed");
            self.shared.begin_close(CloseReason::SendFailed);
            return Err(SessionError::SendFailed);
        }
        Ok(())
    }

    /// Announce orderly termination to the peer (best effort).
    pub async fn send_terminate(&self) {
        if let Err(err) = self.channel.send_control(control::TERMINATE).await {
            tracing::debug!(error = %err, "terminate send failed");
        }
    }

    /// Begin closing with `reason`. Idempotent; only the first reason is
    /// recorded.
    pub fn close(&self, reason: CloseReason) {
        self.shared.begin_close(reason);
    }

    /// State snapshot, mainly for diagnostics.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }
}

/// Send the keep-alive sentinel on a fixed cadence until close. A failed
/// keep-alive is only logged: if the link is truly dead the peer's
/// watchdog, or ours, will notice.
async fn heartbeat_loop(channel: Arc<dyn PeerChannel>, shared: Arc<Shared>, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately; skip it so beats
    // land on the configured spacing after open.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = channel.send_control(control::KEEP_ALIVE).await {
                    tracing::debug!(error = %err, "keep-alive send failed");
                }
            }
        }
    }
}

/// Classify inbound traffic and enforce the receive watchdog. The deadline
/// is recomputed after every received message, so any traffic - control or
/// payload - counts as liveness.
async fn dispatch_loop(
    mut events: mpsc::Receiver<ChannelEvent>,
    payload_tx: mpsc::Sender<Bytes>,
    shared: Arc<Shared>,
    liveness: Duration,
) {
    loop {
        let deadline = Instant::now() + liveness;
        tokio::select! {
            _ = shared.cancel.cancelled() => break,

            _ = time::sleep_until(deadline) => {
                tracing::warn!(timeout = ?liveness, "no traffic from peer, declaring session dead");
                shared.begin_close(CloseReason::LivenessTimeout);
                break;
            }

            event = events.recv() => match event {
                None => {
                    // Transport dropped without a terminate: the peer's end
                    // is gone.
                    shared.begin_close(CloseReason::PeerRequestedTermination);
                    break;
                }
                Some(ChannelEvent::Open) => {}
                Some(ChannelEvent::Text(text)) => {
                    match Inbound::classify(true, Bytes::from(text)) {
                        Inbound::Terminate => {
                            shared.begin_close(CloseReason::PeerRequestedTermination);
                            break;
                        }
                        _ => {}
                    }
                }
                Some(ChannelEvent::Binary(data)) => {
                    if let Inbound::Payload(payload) = Inbound::classify(false, data) {
                        // A gone bridge means the session is ending anyway.
                        let _ = payload_tx.send(payload).await;
                    }
                }
            }
        }
    }
    shared.finish_close();
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::channel::ChannelError;

    #[derive(Debug, PartialEq)]
    enum Sent {
        Control(String),
        Payload(Bytes),
    }

    #[derive(Default)]
    struct MockChannel {
        sent: Mutex<Vec<Sent>>,
        reject_payloads: bool,
    }

    impl MockChannel {
        fn rejecting() -> Self {
            Self {
                reject_payloads: true,
                ..Default::default()
            }
        }

        fn control_count(&self, text: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|s| matches!(s, Sent::Control(t) if t == text))
                .count()
        }
    }

    #[async_trait]
    impl PeerChannel for MockChannel {
        async fn send_payload(&self, data: Bytes) -> Result<(), ChannelError> {
            if self.reject_payloads {
                return Err(ChannelError::Send("channel closed".to_string()));
            }
            self.sent.lock().unwrap().push(Sent::Payload(data));
            Ok(())
        }

        async fn send_control(&self, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(Sent::Control(text.to_string()));
            Ok(())
        }
    }

    async fn open_session(
        channel: Arc<MockChannel>,
    ) -> (PeerSession, mpsc::Sender<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        events_tx.send(ChannelEvent::Open).await.unwrap();
        let session = PeerSession::establish(channel, events_rx, SessionTiming::default())
            .await
            .unwrap();
        (session, events_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_times_out_without_open() {
        let (_events_tx, events_rx) = mpsc::channel::<ChannelEvent>(16);
        let started = Instant::now();

        let result = PeerSession::establish(
            Arc::new(MockChannel::default()),
            events_rx,
            SessionTiming::default(),
        )
        .await;

        assert!(matches!(result, Err(SessionError::OpenTimeout(_))));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_declares_session_dead_after_deadline() {
        let channel = Arc::new(MockChannel::default());
        let (session, _events_tx) = open_session(Arc::clone(&channel)).await;

        let started = Instant::now();
        let mut monitor = session.monitor();
        let reason = monitor.closed().await;

        assert_eq!(reason, CloseReason::LivenessTimeout);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_traffic_resets_watchdog() {
        let channel = Arc::new(MockChannel::default());
        let (session, events_tx) = open_session(Arc::clone(&channel)).await;
        let mut monitor = session.monitor();

        // Keep-alives every 10 seconds hold the 15-second watchdog off.
        for _ in 0..3 {
            time::sleep(Duration::from_secs(10)).await;
            assert!(matches!(monitor.state(), SessionState::Open));
            events_tx
                .send(ChannelEvent::Text(control::KEEP_ALIVE.to_string()))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }

        // Silence after the last reset still ends the session.
        let reason = monitor.closed().await;
        assert_eq!(reason, CloseReason::LivenessTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_ends_session_immediately() {
        let channel = Arc::new(MockChannel::default());
        let (session, events_tx) = open_session(Arc::clone(&channel)).await;

        events_tx
            .send(ChannelEvent::Text(control::TERMINATE.to_string()))
            .await
            .unwrap();

        let reason = session.monitor().closed().await;
        assert_eq!(reason, CloseReason::PeerRequestedTermination);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_is_forwarded_to_bridge() {
        let channel = Arc::new(MockChannel::default());
        let (mut session, events_tx) = open_session(Arc::clone(&channel)).await;
        let mut payloads = session.take_payloads().unwrap();

        events_tx
            .send(ChannelEvent::Binary(Bytes::from_static(b"ls\n")))
            .await
            .unwrap();

        let payload = payloads.recv().await.unwrap();
        assert_eq!(payload, Bytes::from_static(b"ls\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_emits_on_interval() {
        let channel = Arc::new(MockChannel::default());
        let (_session, events_tx) = open_session(Arc::clone(&channel)).await;

        // Feed the watchdog while two heartbeat ticks elapse.
        for _ in 0..2 {
            time::sleep(Duration::from_secs(6)).await;
            events_tx
                .send(ChannelEvent::Text(control::KEEP_ALIVE.to_string()))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }

        assert!(channel.control_count(control::KEEP_ALIVE) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_closes_session() {
        let channel = Arc::new(MockChannel::rejecting());
        let (session, _events_tx) = open_session(Arc::clone(&channel)).await;

        let err = session.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, SessionError::SendFailed));

        let reason = session.monitor().closed().await;
        assert_eq!(reason, CloseReason::SendFailed);

        // Further sends report the recorded reason.
        let err = session.send(Bytes::from_static(b"y")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Closed(CloseReason::SendFailed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_close_reason_wins() {
        let channel = Arc::new(MockChannel::default());
        let (session, events_tx) = open_session(Arc::clone(&channel)).await;

        session.close(CloseReason::LocalSignal);
        // A racing terminate must not overwrite the recorded reason.
        let _ = events_tx
            .send(ChannelEvent::Text(control::TERMINATE.to_string()))
            .await;

        let reason = session.monitor().closed().await;
        assert_eq!(reason, CloseReason::LocalSignal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_loss_reads_as_peer_termination() {
        let channel = Arc::new(MockChannel::default());
        let (session, events_tx) = open_session(Arc::clone(&channel)).await;

        drop(events_tx);
        let reason = session.monitor().closed().await;
        assert_eq!(reason, CloseReason::PeerRequestedTermination);
    }
}
