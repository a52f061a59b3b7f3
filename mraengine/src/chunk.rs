use std::sync::Arc;

use mramodel::StreamProfile;

/// One encoded chunk of a sub-stream.
///
/// Chunks are shared between subscribers through `Arc`; cloning a chunk
/// handle never copies the payload.
#[derive(Clone, Debug)]
pub struct EncodedChunk {
    pub profile: StreamProfile,
    pub payload: Arc<[u8]>,
    /// Position of this chunk within the session's sub-stream.
    pub sequence: u64,
}

impl EncodedChunk {
    pub fn new(profile: StreamProfile, payload: Vec<u8>, sequence: u64) -> Self {
        Self {
            profile,
            payload: payload.into(),
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
