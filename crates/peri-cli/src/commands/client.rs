//! Client subcommand: the initiator role
//!
//! Authenticates against the device directory, resolves the endpoint name,
//! fires the remote session trigger, drives the rendezvous, and then hands
//! the open session to the interactive bridge.

use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::{Input, Password};

use peri_core::config::ClientConfig;
use peri_core::directory::DirectoryClient;
use peri_core::types::Credential;
use peri_session::bridge;
use peri_session::{PeerEndpoint, PeerSession, SessionTiming};
use peri_signal::{RemoteStore, Rendezvous};

use crate::output::{print_info, print_success};

/// Run the initiator flow against `endpoint`.
pub async fn run(
    config: ClientConfig,
    endpoint: Option<&str>,
    directory_host: Option<&str>,
) -> Result<()> {
    let endpoint = endpoint.unwrap_or(&config.endpoint);
    let host = match directory_host {
        Some(host) => host,
        None => config.directory_host()?,
    };

    let credential = prompt_credential()?;

    let mut directory = DirectoryClient::new(host);
    print_info("Authenticating with the device directory...");
    let token = directory.authenticate(&credential).await?;
    print_success("Authenticated");

    print_info(&format!("Looking up device '{}'...", endpoint));
    let device = directory.find_device(endpoint).await?;
    print_success(&format!("Found device {}", device.device_id));

    // The peer connection must exist before the remote offer arrives so
    // the announced data channel lands on a registered handler.
    let peer = PeerEndpoint::connect(&config.ice_servers).await?;
    let (link, events) = peer.expect_channel();

    let mut rendezvous = Rendezvous::new(RemoteStore::new(host, token, &device.device_id));
    directory
        .start_remote_session(&device, rendezvous.layout().start_trigger())
        .await
        .context("failed to trigger the device session")?;

    print_info("Waiting for the device's offer...");
    let offer = rendezvous.await_offer().await?;
    peer.apply_remote_description(&offer).await?;
    print_success("Offer received");

    print_info("Sending answer...");
    let answer = peer.create_answer_description().await?;
    rendezvous.post_answer(&answer).await?;
    rendezvous.await_completion().await?;
    print_success("Handshake complete");

    let session = PeerSession::establish(Arc::new(link), events, SessionTiming::default()).await?;
    print_success("Connected - interactive session started");

    let reason = bridge::run_interactive(session).await?;
    tracing::info!(%reason, "session ended");
    peer.close().await;
    Ok(())
}

fn prompt_credential() -> Result<Credential> {
    let email: String = Input::new()
        .with_prompt("Account email")
        .interact_text()
        .context("failed to read email")?;
    let password = Password::new()
        .with_prompt("Account password")
        .interact()
        .context("failed to read password")?;
    Ok(Credential { email, password })
}
