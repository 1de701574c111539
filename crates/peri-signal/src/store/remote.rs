//! Directory-API-backed resource store
//!
//! Used by the initiator, which can only reach the device's slots through
//! the management cloud. Reads and writes are plain authenticated REST
//! calls; the management channel relays them to the device asynchronously.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use peri_core::directory::{API_KEY_HEADER, API_TOKEN_HEADER};
use peri_core::AuthToken;
use peri_protocol::ResourcePath;

use super::{ResourceStore, ResourceValue, StoreError};

/// Wire form of a resource read: `{"id": .., "type": .., "value": ..}`.
#[derive(Debug, Deserialize)]
struct ResourceBody {
    value: serde_json::Value,
}

/// Store scoped to one device, addressed through the directory API.
pub struct RemoteStore {
    http: reqwest::Client,
    base_url: String,
    token: AuthToken,
    device_id: String,
}

impl RemoteStore {
    /// Create a store for `device_id` using an authenticated token.
    pub fn new(base_url: &str, token: AuthToken, device_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            device_id: device_id.to_string(),
        }
    }

    fn slot_url(&self, slot: ResourcePath) -> String {
        format!(
            "{}/v1/devices/{}/{}/{}/{}",
            self.base_url, self.device_id, slot.object_id, slot.instance_id, slot.resource_id
        )
    }
}

#[async_trait]
impl ResourceStore for RemoteStore {
    async fn read(&self, slot: ResourcePath) -> Result<ResourceValue, StoreError> {
        let response = self
            .http
            .get(format!("{}?model=false", self.slot_url(slot)))
            .header(API_KEY_HEADER, &self.token.api_key)
            .header(API_TOKEN_HEADER, &self.token.token)
            .send()
            .await
            .map_err(|err| StoreError::ReadFailed {
                slot,
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(slot));
        }
        if !status.is_success() {
            return Err(StoreError::ReadFailed {
                slot,
                message: format!("status {}", status),
            });
        }

        let body: ResourceBody = response.json().await.map_err(|err| StoreError::ReadFailed {
            slot,
            message: err.to_string(),
        })?;

        match body.value {
            serde_json::Value::String(text) => Ok(ResourceValue::Text(text)),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(ResourceValue::Integer(value))
                } else {
                    Ok(ResourceValue::Text(number.to_string()))
                }
            }
            other => Err(StoreError::ReadFailed {
                slot,
                message: format!("unsupported value {}", other),
            }),
        }
    }

    async fn write(&self, slot: ResourcePath, value: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .put(self.slot_url(slot))
            .header(API_KEY_HEADER, &self.token.api_key)
            .header(API_TOKEN_HEADER, &self.token.token)
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(|err| StoreError::WriteFailed {
                slot,
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::WriteFailed {
                slot,
                message: format!("status {}", status),
            })
        }
    }
}
