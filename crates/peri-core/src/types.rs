//! Shared directory domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account credential, exchanged once for an [`AuthToken`].
#[derive(Clone, Serialize)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque token attached to every authenticated directory call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub api_key: String,
    pub operator_id: String,
    pub token: String,
}

/// A device known to the directory, addressed by its endpoint name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub endpoint: String,
}
