//! WebRTC peer-channel provider
//!
//! Wraps the `webrtc` crate behind the [`PeerChannel`] seam. A
//! [`PeerEndpoint`] owns the peer connection and hands out the channel
//! handle plus its event stream; handshake descriptions cross the
//! rendezvous as the JSON form of the session description, with candidate
//! gathering finished before export so no trickle path is needed.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::channel::{ChannelError, ChannelEvent, PeerChannel};

/// Capacity of the event queue between transport callbacks and the session
/// dispatcher. Holds bursts of inbound messages while the dispatcher is
/// writing to the local surface.
const CHANNEL_EVENT_CAPACITY: usize = 256;

/// Label of the single data channel carrying the terminal stream.
const DATA_CHANNEL_LABEL: &str = "data";

/// One end of the peer transport.
pub struct PeerEndpoint {
    connection: Arc<RTCPeerConnection>,
}

/// Channel handle backed by a WebRTC data channel.
///
/// On the initiator side the underlying channel only exists once the peer
/// announces it, so the slot starts empty and writes before then fail with
/// [`ChannelError::NotOpen`].
pub struct DataLink {
    channel: Arc<OnceLock<Arc<RTCDataChannel>>>,
}

impl PeerEndpoint {
    /// Create a peer connection configured with the given ICE servers.
    pub async fn connect(ice_servers: &[String]) -> Result<Self> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .context("failed to register codecs")?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)
            .context("failed to register interceptors")?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let connection = api
            .new_peer_connection(config)
            .await
            .context("failed to create peer connection")?;

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Responder path: create the data channel this end announces.
    pub async fn create_channel(&self) -> Result<(DataLink, mpsc::Receiver<ChannelEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);
        let channel = self
            .connection
            .create_data_channel(DATA_CHANNEL_LABEL, None)
            .await
            .context("failed to create data channel")?;
        wire_channel(&channel, events_tx);

        let slot = Arc::new(OnceLock::new());
        let _ = slot.set(channel);
        Ok((DataLink { channel: slot }, events_rx))
    }

    /// Initiator path: adopt the data channel the peer announces.
    pub fn expect_channel(&self) -> (DataLink, mpsc::Receiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);
        let slot: Arc<OnceLock<Arc<RTCDataChannel>>> = Arc::new(OnceLock::new());

        let adopted = Arc::clone(&slot);
        self.connection
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let events_tx = events_tx.clone();
                let adopted = Arc::clone(&adopted);
                Box::pin(async move {
                    tracing::debug!(label = %channel.label(), "data channel announced");
                    wire_channel(&channel, events_tx);
                    let _ = adopted.set(channel);
                })
            }));

        (DataLink { channel: slot }, events_rx)
    }

    /// Create the local offer and export it once candidate gathering has
    /// finished, so the description is complete when it crosses the slots.
    pub async fn create_offer_description(&self) -> Result<Vec<u8>> {
        let offer = self
            .connection
            .create_offer(None)
            .await
            .context("failed to create offer")?;
        self.export_local_description(offer).await
    }

    /// Create the local answer for a previously applied remote offer.
    pub async fn create_answer_description(&self) -> Result<Vec<u8>> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .context("failed to create answer")?;
        self.export_local_description(answer).await
    }

    /// Apply the remote description received through the rendezvous.
    pub async fn apply_remote_description(&self, raw: &[u8]) -> Result<()> {
        let description: RTCSessionDescription =
            serde_json::from_slice(raw).context("failed to parse remote description")?;
        self.connection
            .set_remote_description(description)
            .await
            .context("failed to apply remote description")?;
        Ok(())
    }

    /// Close the underlying peer connection.
    pub async fn close(&self) {
        if let Err(err) = self.connection.close().await {
            tracing::debug!(error = %err, "peer connection close failed");
        }
    }

    async fn export_local_description(
        &self,
        description: RTCSessionDescription,
    ) -> Result<Vec<u8>> {
        // The gathering promise must exist before set_local_description
        // starts the gather.
        let mut gathered = self.connection.gathering_complete_promise().await;
        self.connection
            .set_local_description(description)
            .await
            .context("failed to set local description")?;
        let _ = gathered.recv().await;

        let local = self
            .connection
            .local_description()
            .await
            .context("local description missing after gathering")?;
        serde_json::to_vec(&local).context("failed to serialize local description")
    }
}

fn wire_channel(channel: &Arc<RTCDataChannel>, events: mpsc::Sender<ChannelEvent>) {
    let on_open = events.clone();
    channel.on_open(Box::new(move || {
        let events = on_open.clone();
        Box::pin(async move {
            let _ = events.send(ChannelEvent::Open).await;
        })
    }));

    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let events = events.clone();
        Box::pin(async move {
            let event = if message.is_string {
                ChannelEvent::Text(String::from_utf8_lossy(&message.data).into_owned())
            } else {
                ChannelEvent::Binary(message.data)
            };
            let _ = events.send(event).await;
        })
    }));
}

#[async_trait]
impl PeerChannel for DataLink {
    async fn send_payload(&self, data: Bytes) -> Result<(), ChannelError> {
        let channel = self.channel.get().ok_or(ChannelError::NotOpen)?;
        channel
            .send(&data)
            .await
            .map_err(|err| ChannelError::Send(err.to_string()))?;
        Ok(())
    }

    async fn send_control(&self, text: &str) -> Result<(), ChannelError> {
        let channel = self.channel.get().ok_or(ChannelError::NotOpen)?;
        channel
            .send_text(text)
            .await
            .map_err(|err| ChannelError::Send(err.to_string()))?;
        Ok(())
    }
}
