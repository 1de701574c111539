//! Daemon subcommand and the execute trampoline
//!
//! The daemon provisions the signaling slots under the resource root and
//! then supervises the external device-management agent, which owns
//! registration with the management cloud and serves the resource tree.
//! The execute trampoline is what the agent's trigger script invokes when
//! the directory fires the start action: it detaches a device-mode child
//! and returns immediately so the agent is not held up.

use anyhow::{bail, Context, Result};

use peri_core::config::DeviceConfig;
use peri_core::scaffold;
use peri_protocol::SignalingLayout;

use crate::output::{print_info, print_success};

/// Provision the resource tree, then run the configured management agent
/// and forward its exit status.
pub async fn run(config: DeviceConfig, endpoint: Option<&str>) -> Result<()> {
    let endpoint = endpoint.unwrap_or(&config.endpoint);
    let root = config.resource_root()?;
    let exe = std::env::current_exe().context("failed to locate executable")?;

    let layout = SignalingLayout::default();
    let result = scaffold::provision_resource_tree(&root, &layout, &exe)?;
    if result.created > 0 {
        print_success(&format!(
            "Provisioned {} resource slots under {}",
            result.created,
            result.resource_dir.display()
        ));
    }

    let Some(agent_command) = config.agent_command.as_deref() else {
        bail!("no management agent configured; set [device] agent_command in the config file");
    };

    let mut parts = agent_command.split_whitespace();
    let program = parts.next().context("agent_command is empty")?;

    print_info(&format!(
        "Starting management agent for endpoint '{}'...",
        endpoint
    ));
    let status = tokio::process::Command::new(program)
        .args(parts)
        .env("PERISCOPE_ENDPOINT", endpoint)
        .status()
        .await
        .with_context(|| format!("failed to run the management agent '{}'", program))?;

    if !status.success() {
        bail!("management agent exited with {}", status);
    }
    Ok(())
}

/// Detach a device-mode run and return immediately.
pub fn execute() -> Result<()> {
    let exe = std::env::current_exe().context("failed to locate executable")?;
    let child = std::process::Command::new(exe)
        .arg("device")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("failed to start device session")?;
    tracing::info!(pid = child.id(), "device session started");
    Ok(())
}
