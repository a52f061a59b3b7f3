//! The immutable playback plan.

use mramodel::{AudioType, PreferredOutput, TrackMetadata};

/// Everything needed to execute one playback start, computed up front so
/// the execution path has no decisions left to make.
#[derive(Clone, Debug)]
pub struct PlaybackPlan {
    pub audiopath: String,
    pub metadata: TrackMetadata,
    pub classification: AudioType,
    pub preferred: PreferredOutput,
    /// Provider tag of the audiopath ("library", "spotify", ...).
    pub provider: String,
    /// External input label responsible for delivery, when the source is
    /// not pulled by the engine itself (Spotify offload, Music Assistant).
    pub input_label: Option<String>,
    /// Seek offset in milliseconds for position-restart.
    pub seek_ms: Option<u64>,
}

impl PlaybackPlan {
    pub fn is_radio(&self) -> bool {
        self.classification == AudioType::Radio
    }
}
