//! File-backed resource store
//!
//! The management agent persists one file per resource under the resource
//! directory. The responder runs on the same host and reads and writes
//! those files directly, which is also how the agent observes the
//! responder's status updates.

use std::path::PathBuf;

use async_trait::async_trait;

use peri_protocol::ResourcePath;

use super::{ResourceStore, ResourceValue, StoreError};

/// Store rooted at the agent's resource directory.
pub struct LocalStore {
    resource_dir: PathBuf,
}

impl LocalStore {
    /// Create a store over `resource_dir` (the directory holding the
    /// per-object subtrees, not the app root).
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
        }
    }

    fn slot_path(&self, slot: ResourcePath) -> PathBuf {
        self.resource_dir
            .join(slot.object_id.to_string())
            .join(slot.instance_id.to_string())
            .join(slot.resource_id.to_string())
    }
}

#[async_trait]
impl ResourceStore for LocalStore {
    async fn read(&self, slot: ResourcePath) -> Result<ResourceValue, StoreError> {
        match tokio::fs::read_to_string(self.slot_path(slot)).await {
            Ok(content) => Ok(ResourceValue::Text(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(slot))
            }
            Err(err) => Err(StoreError::ReadFailed {
                slot,
                message: err.to_string(),
            }),
        }
    }

    async fn write(&self, slot: ResourcePath, value: &str) -> Result<(), StoreError> {
        let path = self.slot_path(slot);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::WriteFailed {
                    slot,
                    message: err.to_string(),
                })?;
        }
        tokio::fs::write(&path, value)
            .await
            .map_err(|err| StoreError::WriteFailed {
                slot,
                message: err.to_string(),
            })
    }
}
