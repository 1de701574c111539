//! Device subcommand: the responder role
//!
//! Runs on the managed device when the directory fires the session
//! trigger: resets the signaling slots, posts an offer, waits for the
//! answer, and bridges the shell once the channel opens.

use std::sync::Arc;

use anyhow::Result;

use peri_core::config::DeviceConfig;
use peri_core::scaffold::RESOURCE_DIR_NAME;
use peri_session::bridge::{self, ShellConfig};
use peri_session::{PeerEndpoint, PeerSession, SessionTiming};
use peri_signal::{LocalStore, Rendezvous};

/// Run the responder flow for one incoming session.
pub async fn run(config: DeviceConfig) -> Result<()> {
    let root = config.resource_root()?;
    let store = LocalStore::new(root.join(RESOURCE_DIR_NAME));
    let mut rendezvous = Rendezvous::new(store);

    // A stale handshake left in the slots would read as a live offer;
    // start from a clean baseline or not at all.
    rendezvous.reset().await?;

    let peer = PeerEndpoint::connect(&config.ice_servers).await?;
    let (link, events) = peer.create_channel().await?;

    let offer = peer.create_offer_description().await?;
    rendezvous.post_offer(&offer).await?;
    tracing::info!("offer posted, waiting for answer");

    let answer = rendezvous.await_answer().await?;
    peer.apply_remote_description(&answer).await?;
    rendezvous.complete().await?;
    tracing::info!("handshake complete, waiting for channel to open");

    let session = PeerSession::establish(Arc::new(link), events, SessionTiming::default()).await?;

    let shell = ShellConfig {
        program: config.shell.clone(),
        args: config.shell_args.clone(),
        exit_grace: config.exit_grace,
    };
    let reason = bridge::run_shell(session, &shell).await?;
    tracing::info!(%reason, "session ended");
    peer.close().await;
    Ok(())
}
