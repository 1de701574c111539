//! Configuration management for periscope

mod client;
mod device;
pub mod serde_utils;

pub use client::{ClientConfig, DEFAULT_STUN_SERVER};
pub use device::DeviceConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level config file with one section per role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub client: ClientConfig,
    pub device: DeviceConfig,
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("periscope")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            concat!(
                "[client]\n",
                "directory_host = \"https://api.example.com\"\n",
                "\n",
                "[device]\n",
                "agent_command = \"/usr/local/bin/mgmt-agent\"\n",
                "exit_grace = 10\n",
            ),
        )
        .unwrap();

        let loaded: ConfigFile = load_config(&path).unwrap();

        assert_eq!(
            loaded.client.directory_host.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(
            loaded.device.agent_command.as_deref(),
            Some("/usr/local/bin/mgmt-agent")
        );
        assert_eq!(loaded.device.exit_grace, std::time::Duration::from_secs(10));
        // Unlisted fields fall back to their defaults.
        assert_eq!(loaded.device.shell, "/bin/bash");
    }

    #[test]
    fn test_load_missing_config_fails() {
        let result: Result<ConfigFile, _> = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
