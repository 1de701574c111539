//! Thin client for the device-directory REST API
//!
//! The directory authenticates the operator, resolves endpoint names to
//! device ids, and relays the execute action that starts a responder
//! session on a device. Resource-level reads and writes live in the
//! signaling store, not here.

use reqwest::StatusCode;

use peri_protocol::ResourcePath;

use crate::error::DirectoryError;
use crate::types::{AuthToken, Credential, DeviceRecord};

/// Header carrying the API key of an authenticated token.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Header carrying the token secret.
pub const API_TOKEN_HEADER: &str = "X-Api-Token";

/// Client for the device-directory API.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<AuthToken>,
}

impl DirectoryClient {
    /// Create a client against a directory host, e.g.
    /// `https://api.example.com`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// The configured directory host.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange a credential for an API token. Bad credentials surface as
    /// [`DirectoryError::Auth`] and are not retried.
    pub async fn authenticate(
        &mut self,
        credential: &Credential,
    ) -> Result<AuthToken, DirectoryError> {
        let response = self
            .http
            .post(format!("{}/v1/auth", self.base_url))
            .json(credential)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let token: AuthToken = response
                    .json()
                    .await
                    .map_err(|err| DirectoryError::Decode(err.to_string()))?;
                tracing::debug!(operator = %token.operator_id, "authenticated");
                self.token = Some(token.clone());
                Ok(token)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DirectoryError::Auth),
            status => Err(api_error(status, response).await),
        }
    }

    /// Resolve an endpoint name to its device record. The endpoint must be
    /// unique within the account.
    pub async fn find_device(&self, endpoint: &str) -> Result<DeviceRecord, DirectoryError> {
        let response = self
            .authorized(self.http.get(format!("{}/v1/devices", self.base_url)))?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        let devices: Vec<DeviceRecord> = response
            .json()
            .await
            .map_err(|err| DirectoryError::Decode(err.to_string()))?;

        let mut matches = devices.into_iter().filter(|d| d.endpoint == endpoint);
        match (matches.next(), matches.next()) {
            (Some(device), None) => Ok(device),
            (Some(_), Some(_)) => Err(DirectoryError::Ambiguous(endpoint.to_string())),
            (None, _) => Err(DirectoryError::DeviceNotFound(endpoint.to_string())),
        }
    }

    /// Fire the execute action that asks the device to start a responder
    /// session. Fire-and-forget: a success status is all we learn here; the
    /// device's progress shows up in the status slot.
    pub async fn start_remote_session(
        &self,
        device: &DeviceRecord,
        trigger: ResourcePath,
    ) -> Result<(), DirectoryError> {
        let url = format!(
            "{}/v1/devices/{}/{}/{}/{}/execute",
            self.base_url,
            device.device_id,
            trigger.object_id,
            trigger.instance_id,
            trigger.resource_id
        );
        let response = self.authorized(self.http.post(url))?.send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(api_error(status, response).await)
        }
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, DirectoryError> {
        let token = self.token.as_ref().ok_or(DirectoryError::Auth)?;
        Ok(request
            .header(API_KEY_HEADER, &token.api_key)
            .header(API_TOKEN_HEADER, &token.token))
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> DirectoryError {
    let message = response.text().await.unwrap_or_default();
    DirectoryError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = DirectoryClient::new("https://api.example.com/");
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_calls_require_authentication() {
        let client = DirectoryClient::new("https://api.example.com");
        let result = client.authorized(client.http.get("https://api.example.com/v1/devices"));
        assert!(matches!(result, Err(DirectoryError::Auth)));
    }
}
