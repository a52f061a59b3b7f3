//! Typed events flowing into and out of the per-zone serializer.

use serde::{Deserialize, Serialize};

use crate::metadata::{CoverArtPayload, TrackMetadata};
use crate::session::SessionState;
use crate::zone::{ZoneId, ZoneState};

/// Output-side echo of renderer state.
#[derive(Clone, Debug)]
pub struct OutputStateEvent {
    pub zone_id: ZoneId,
    pub output_type: String,
    pub state: SessionState,
    pub position: Option<u64>,
    pub duration: Option<u64>,
    pub uri: Option<String>,
}

/// Callback from an external input adapter.
///
/// Every variant carries the adapter label; the zone serializer drops the
/// event when the label does not match the zone's active input.
#[derive(Clone, Debug)]
pub enum InputEvent {
    Metadata {
        zone_id: ZoneId,
        label: String,
        update: TrackMetadata,
    },
    Timing {
        zone_id: ZoneId,
        label: String,
        elapsed: u64,
        duration: u64,
    },
    Volume {
        zone_id: ZoneId,
        label: String,
        volume: u32,
    },
    Cover {
        zone_id: ZoneId,
        label: String,
        payload: CoverArtPayload,
    },
    EndOfTrack {
        zone_id: ZoneId,
        label: String,
    },
}

impl InputEvent {
    pub fn zone_id(&self) -> ZoneId {
        match self {
            InputEvent::Metadata { zone_id, .. }
            | InputEvent::Timing { zone_id, .. }
            | InputEvent::Volume { zone_id, .. }
            | InputEvent::Cover { zone_id, .. }
            | InputEvent::EndOfTrack { zone_id, .. } => *zone_id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            InputEvent::Metadata { label, .. }
            | InputEvent::Timing { label, .. }
            | InputEvent::Volume { label, .. }
            | InputEvent::Cover { label, .. }
            | InputEvent::EndOfTrack { label, .. } => label,
        }
    }
}

/// One-way notifications towards the upstream controller.
///
/// Delivery never blocks the core longer than an enqueue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifierEvent {
    ZoneStateChanged {
        zone_id: ZoneId,
        state: Box<ZoneState>,
    },
    QueueUpdated {
        zone_id: ZoneId,
        queue_size: usize,
        current_index: usize,
    },
    PlaybackFailed {
        zone_id: ZoneId,
        reason: String,
    },
    FavoritesChanged {
        zone_id: ZoneId,
    },
    RecentsChanged {
        zone_id: ZoneId,
    },
    RescanProgress {
        percent: u8,
    },
    StorageListUpdated,
    ReloadMusicApp,
    GlobalSearchResult {
        query: String,
        payload: serde_json::Value,
    },
    GlobalSearchError {
        query: String,
        message: String,
    },
    AudioSyncGroup {
        payload: serde_json::Value,
    },
}
