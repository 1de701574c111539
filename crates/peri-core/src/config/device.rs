//! Device (responder) configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::client::DEFAULT_STUN_SERVER;
use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the on-device responder and the daemon glue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Root under which the management agent persists the resource tree.
    /// Defaults to the directory containing the running executable.
    pub resource_root: Option<PathBuf>,

    /// Shell spawned for the remote session.
    pub shell: String,

    /// Arguments passed to the shell.
    pub shell_args: Vec<String>,

    /// STUN/TURN servers handed to the peer connection.
    pub ice_servers: Vec<String>,

    /// Endpoint name the management agent registers under.
    pub endpoint: String,

    /// Command line that runs the external device-management agent
    /// (daemon mode). The endpoint name is passed to it via the
    /// `PERISCOPE_ENDPOINT` environment variable.
    pub agent_command: Option<String>,

    /// How long the responder waits after announcing termination before
    /// tearing the channel down, so the message can still be delivered.
    #[serde(with = "duration_secs")]
    pub exit_grace: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            resource_root: None,
            shell: "/bin/bash".to_string(),
            shell_args: vec!["-l".to_string()],
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            endpoint: "periscope-device".to_string(),
            agent_command: None,
            exit_grace: Duration::from_secs(5),
        }
    }
}

impl DeviceConfig {
    /// The resolved resource root.
    pub fn resource_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.resource_root {
            return Ok(root.clone());
        }
        let exe = std::env::current_exe()
            .map_err(|e| ConfigError::Invalid(format!("cannot locate executable: {}", e)))?;
        Ok(exe
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf())
    }
}
