//! Registry of in-process PCM pipes.
//!
//! External input receivers (AirPlay, Spotify Connect, line-in bridges)
//! deliver raw PCM through a named pipe: the adapter writes, the zone
//! pipeline registered under the same label reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::EngineError;

const PIPE_DEPTH: usize = 64;

/// Registry mapping pipe labels to the writer side.
#[derive(Clone, Default)]
pub struct PcmPipes {
    writers: Arc<Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>>,
}

impl PcmPipes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the pipe for `label` and returns the reader side.
    ///
    /// Fails when a pipeline already reads from this label.
    pub(crate) fn open(&self, label: &str) -> Result<mpsc::Receiver<Vec<u8>>, EngineError> {
        let mut writers = self.writers.lock().unwrap();
        if writers.contains_key(label) {
            return Err(EngineError::PipeBusy(label.to_string()));
        }
        let (tx, rx) = mpsc::channel(PIPE_DEPTH);
        writers.insert(label.to_string(), tx);
        debug!(label, "pcm pipe opened");
        Ok(rx)
    }

    pub(crate) fn close(&self, label: &str) {
        if self.writers.lock().unwrap().remove(label).is_some() {
            debug!(label, "pcm pipe closed");
        }
    }

    /// Writer handle for an adapter; `None` when no pipeline reads the
    /// label (yet, or anymore).
    pub fn writer(&self, label: &str) -> Option<mpsc::Sender<Vec<u8>>> {
        self.writers.lock().unwrap().get(label).cloned()
    }
}
