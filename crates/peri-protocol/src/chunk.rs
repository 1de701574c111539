//! Chunked encoding of handshake descriptions
//!
//! A handshake description runs to a few kilobytes, but each signaling slot
//! holds at most [`CHUNK_CAPACITY`] bytes. Descriptions are split across up
//! to [`MAX_CHUNKS`] slots in ascending instance order. A chunk shorter than
//! the capacity marks the end of the message, which lets a reader stop
//! before stale data left in later slots by an earlier handshake.
//!
//! When the payload length is an exact multiple of the capacity the final
//! chunk would be indistinguishable from a full intermediate one, so the
//! encoder appends an empty terminator chunk. The one exception is a payload
//! of exactly [`MAX_MESSAGE_SIZE`] bytes: all slots are full and the slot
//! count itself ends decoding.

use bytes::Bytes;
use thiserror::Error;

/// Capacity of a single signaling slot in bytes.
pub const CHUNK_CAPACITY: usize = 800;

/// Number of slots available to one description.
pub const MAX_CHUNKS: usize = 4;

/// Largest description that fits the slot set.
pub const MAX_MESSAGE_SIZE: usize = CHUNK_CAPACITY * MAX_CHUNKS;

/// Errors from chunk encoding.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkError {
    /// Description does not fit the slot set. Never truncated.
    #[error("description of {size} bytes exceeds the {max}-byte slot capacity")]
    TooLarge { size: usize, max: usize },
}

/// Split `payload` into ordered chunks of at most [`CHUNK_CAPACITY`] bytes.
///
/// Returns at most [`MAX_CHUNKS`] chunks, terminator included. Fails with
/// [`ChunkError::TooLarge`] when the payload exceeds [`MAX_MESSAGE_SIZE`].
pub fn encode(payload: &[u8]) -> Result<Vec<Bytes>, ChunkError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ChunkError::TooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut chunks: Vec<Bytes> = payload
        .chunks(CHUNK_CAPACITY)
        .map(Bytes::copy_from_slice)
        .collect();

    // An empty payload or one sitting exactly on a chunk boundary needs the
    // explicit terminator, unless every slot is already occupied.
    let boundary = chunks.last().map_or(true, |last| last.len() == CHUNK_CAPACITY);
    if boundary && chunks.len() < MAX_CHUNKS {
        chunks.push(Bytes::new());
    }

    Ok(chunks)
}

/// Reassemble a description from chunks read in ascending slot order.
///
/// Stops at the first chunk shorter than [`CHUNK_CAPACITY`] bytes, or after
/// [`MAX_CHUNKS`] chunks, whichever comes first. Anything past that point is
/// stale slot data and is ignored.
pub fn decode<I, B>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut message = Vec::new();
    for chunk in chunks.into_iter().take(MAX_CHUNKS) {
        let chunk = chunk.as_ref();
        message.extend_from_slice(chunk);
        if chunk.len() < CHUNK_CAPACITY {
            break;
        }
    }
    message
}
