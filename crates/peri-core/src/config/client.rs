//! Client (initiator) configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Public STUN server used when no ICE servers are configured.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration for the operator-side client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the device-directory API, e.g. `https://api.example.com`.
    ///
    /// Required for any client run; there is no built-in cloud default.
    pub directory_host: Option<String>,

    /// Endpoint name to connect to when none is given on the command line.
    pub endpoint: String,

    /// STUN/TURN servers handed to the peer connection.
    pub ice_servers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_host: None,
            endpoint: "periscope-device".to_string(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

impl ClientConfig {
    /// The directory host, required before any directory call.
    pub fn directory_host(&self) -> Result<&str, ConfigError> {
        self.directory_host
            .as_deref()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigError::MissingField("client.directory_host".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_host_is_required() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.directory_host(),
            Err(ConfigError::MissingField(_))
        ));

        let config = ClientConfig {
            directory_host: Some("https://api.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.directory_host().unwrap(), "https://api.example.com");
    }
}
