//! Uniform access to signaling resource slots

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use async_trait::async_trait;
use thiserror::Error;

use peri_protocol::ResourcePath;

/// Value held by a resource slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValue {
    Integer(i64),
    Text(String),
}

impl ResourceValue {
    /// Integer view. Text holding a decimal number also qualifies, since
    /// the file-backed store keeps everything as text.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ResourceValue::Integer(value) => Some(*value),
            ResourceValue::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Text view; integers are not coerced.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResourceValue::Integer(_) => None,
            ResourceValue::Text(text) => Some(text),
        }
    }

    /// Consume into text form.
    pub fn into_text(self) -> String {
        match self {
            ResourceValue::Integer(value) => value.to_string(),
            ResourceValue::Text(text) => text,
        }
    }
}

/// Store errors. Reads and writes fail independently; the rendezvous
/// machine decides what is fatal.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The slot has no value.
    #[error("resource {0} not found")]
    NotFound(ResourcePath),

    /// The read could not be performed.
    #[error("failed to read resource {slot}: {message}")]
    ReadFailed { slot: ResourcePath, message: String },

    /// The write could not be performed.
    #[error("failed to write resource {slot}: {message}")]
    WriteFailed { slot: ResourcePath, message: String },
}

/// Flat key→value access to the signaling slots.
///
/// One implementation talks to the directory API on behalf of the
/// initiator; the other reads the file tree the management agent persists
/// on the device. Writes always carry text, matching the wire format of
/// both backends; no transactional semantics are assumed.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn read(&self, slot: ResourcePath) -> Result<ResourceValue, StoreError>;
    async fn write(&self, slot: ResourcePath, value: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_int_parses_text() {
        assert_eq!(ResourceValue::Integer(2).as_int(), Some(2));
        assert_eq!(ResourceValue::Text("1".to_string()).as_int(), Some(1));
        assert_eq!(ResourceValue::Text(" 2\n".to_string()).as_int(), Some(2));
        assert_eq!(ResourceValue::Text("done".to_string()).as_int(), None);
        assert_eq!(ResourceValue::Text(String::new()).as_int(), None);
    }

    #[test]
    fn test_as_text_does_not_coerce_integers() {
        assert_eq!(ResourceValue::Integer(1).as_text(), None);
        assert_eq!(
            ResourceValue::Text("done".to_string()).as_text(),
            Some("done")
        );
    }
}
