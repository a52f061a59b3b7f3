//! Playback sessions created by the audio engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::TrackMetadata;
use crate::source::PlaybackSource;
use crate::zone::ZoneId;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Playing,
    Paused,
    Stopped,
}

/// Descriptor of one encoded sub-stream of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A running (or retired) playback session.
///
/// Created when a pipeline starts, destroyed on stop, never revived. A
/// handoff produces a new session and retires the old one only once the new
/// one has reached first-chunk.
#[derive(Clone, Debug)]
pub struct PlaybackSession {
    pub zone_id: ZoneId,
    /// Human-readable origin label ("queue", "airplay", "alert", ...).
    pub source: String,
    pub metadata: TrackMetadata,
    pub streams: Vec<StreamDescriptor>,
    /// Present when a PCM subscriber was attached for grouped outputs.
    pub pcm_stream: Option<StreamDescriptor>,
    pub state: SessionState,
    /// Elapsed seconds at the last update.
    pub elapsed: u64,
    pub duration: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The source the pipeline was started from.
    pub playback_source: PlaybackSource,
}

impl PlaybackSession {
    pub fn stream(&self, id: &str) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.id == id)
    }
}
