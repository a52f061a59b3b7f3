use thiserror::Error;

use mramodel::{StreamProfile, ZoneId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no session for {0}")]
    NoSession(ZoneId),
    #[error("session for {0} has no {1:?} stream")]
    NoProfile(ZoneId, StreamProfile),
    #[error("source failed: {0}")]
    SourceFailed(String),
    #[error("first chunk timeout after {0} ms")]
    FirstChunkTimeout(u64),
    #[error("handoff failed for {zone}: {message}")]
    HandoffFailed { zone: ZoneId, message: String },
    #[error("pcm pipe '{0}' already registered")]
    PipeBusy(String),
    #[error("http: {0}")]
    Http(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Clone for EngineError {
    fn clone(&self) -> Self {
        match self {
            EngineError::NoSession(zone) => EngineError::NoSession(*zone),
            EngineError::NoProfile(zone, profile) => EngineError::NoProfile(*zone, *profile),
            EngineError::SourceFailed(m) => EngineError::SourceFailed(m.clone()),
            EngineError::FirstChunkTimeout(ms) => EngineError::FirstChunkTimeout(*ms),
            EngineError::HandoffFailed { zone, message } => EngineError::HandoffFailed {
                zone: *zone,
                message: message.clone(),
            },
            EngineError::PipeBusy(label) => EngineError::PipeBusy(label.clone()),
            EngineError::Http(m) => EngineError::Http(m.clone()),
            EngineError::Io(e) => EngineError::SourceFailed(e.to_string()),
        }
    }
}
