//! Playback error taxonomy.
//!
//! Errors that cross component boundaries travel as values through the
//! per-zone message queue, so the coordinator consumes normal updates and
//! error variants through the same ordered channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zone::ZoneId;

/// Which side of the pipeline produced a playback error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Player,
    Output,
}

/// Reason token carried by stop notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserRequest,
    QueueEnd,
    QueueInvalidNext,
    QueueNextFailed,
    NoOutputConfigured,
    StreamUnavailable,
    EngineFailed,
    SwitchToQueue,
    SwitchToInput(String),
    AlertFinished,
    Shutdown,
}

impl StopReason {
    pub fn token(&self) -> String {
        match self {
            StopReason::UserRequest => "user_request".into(),
            StopReason::QueueEnd => "queue_end".into(),
            StopReason::QueueInvalidNext => "queue_invalid_next".into(),
            StopReason::QueueNextFailed => "queue_next_failed".into(),
            StopReason::NoOutputConfigured => "no_output_configured".into(),
            StopReason::StreamUnavailable => "stream_unavailable".into(),
            StopReason::EngineFailed => "engine_failed".into(),
            StopReason::SwitchToQueue => "switch_to_queue".into(),
            StopReason::SwitchToInput(label) => format!("switch_to_{}", label),
            StopReason::AlertFinished => "alert_finished".into(),
            StopReason::Shutdown => "shutdown".into(),
        }
    }
}

/// Classified playback failure.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackErrorKind {
    NoOutputConfigured,
    EngineStartFailed { message: String },
    StreamUnavailable { provider: String },
    OutputError { output_type: String, reason: String },
    GroupBroadcastFailed { reason: String },
}

/// A playback error addressed to one zone.
#[derive(Clone, Debug)]
pub struct PlaybackError {
    pub zone_id: ZoneId,
    pub kind: PlaybackErrorKind,
    pub source: ErrorSource,
    /// Provider tag when the failing component is provider-specific.
    pub provider: Option<String>,
}

impl PlaybackError {
    pub fn new(zone_id: ZoneId, kind: PlaybackErrorKind, source: ErrorSource) -> Self {
        Self {
            zone_id,
            kind,
            source,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Providers that should stay reachable after a failure: the zone
    /// stops, but `power`/`client_state` remain on.
    pub fn provider_stays_reachable(&self) -> bool {
        matches!(
            self.provider.as_deref(),
            Some("musicassistant") | Some("spotify") | Some("applemusic")
        )
    }
}

/// Parse/validation failures inside the model crate.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid audiopath: {0}")]
    InvalidAudiopath(String),
    #[error("invalid repeat mode: {0}")]
    InvalidRepeatMode(u8),
}
