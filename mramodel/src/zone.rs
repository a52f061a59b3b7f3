//! Zone identity and observable state.

use serde::{Deserialize, Serialize};

use crate::metadata::TrackMetadata;
use crate::queue_item::{QueueAuthority, RepeatMode};

/// Logical identifier of a zone (a room).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub u32);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone-{}", self.0)
    }
}

/// Transport mode of a zone as reported upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Play,
    Pause,
    #[default]
    Stop,
}

/// Which input currently owns the zone state.
///
/// Input-side callbacks are gated on this: a callback from an adapter that
/// is not the active input is dropped without touching the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Queue,
    Spotify,
    Airplay,
    MusicAssistant,
    LineIn,
    MixedGroup,
    Alert,
}

impl InputMode {
    /// Inverse of [`InputMode::label`].
    pub fn from_label(label: &str) -> Option<InputMode> {
        match label {
            "queue" => Some(InputMode::Queue),
            "spotify" => Some(InputMode::Spotify),
            "airplay" => Some(InputMode::Airplay),
            "musicassistant" => Some(InputMode::MusicAssistant),
            "linein" => Some(InputMode::LineIn),
            "mixedgroup" => Some(InputMode::MixedGroup),
            "alert" => Some(InputMode::Alert),
            _ => None,
        }
    }

    /// Label used for session gating and notifier payloads.
    pub fn label(&self) -> &'static str {
        match self {
            InputMode::Queue => "queue",
            InputMode::Spotify => "spotify",
            InputMode::Airplay => "airplay",
            InputMode::MusicAssistant => "musicassistant",
            InputMode::LineIn => "linein",
            InputMode::MixedGroup => "mixedgroup",
            InputMode::Alert => "alert",
        }
    }
}

/// Coarse classification of the audio currently bound to a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioType {
    #[default]
    Music,
    Radio,
    LineIn,
    Alert,
}

/// Power / reachability token reported to the upstream controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

/// Per-zone volume policy from the immutable config snapshot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VolumePolicy {
    pub default: u32,
    pub step: u32,
    pub max: u32,
}

impl Default for VolumePolicy {
    fn default() -> Self {
        Self {
            default: 25,
            step: 5,
            max: 100,
        }
    }
}

impl VolumePolicy {
    /// Clamps a requested level to `[0, max]`.
    pub fn clamp(&self, level: i64) -> u32 {
        level.clamp(0, self.max as i64) as u32
    }
}

/// Observable state of a zone, broadcast to the upstream controller on
/// every change (throttled for chatty position/metadata updates).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZoneState {
    pub mode: PlaybackMode,
    #[serde(flatten)]
    pub metadata: TrackMetadata,
    /// Elapsed playback time in seconds.
    pub time: u64,
    pub audiopath: String,
    pub qindex: usize,
    pub qid: String,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    /// Who drives queue advancement for the current queue.
    pub authority: QueueAuthority,
    pub volume: u32,
    pub power: PowerState,
    pub client_state: PowerState,
    pub audio_type: AudioType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamp() {
        let policy = VolumePolicy {
            default: 25,
            step: 5,
            max: 80,
        };
        assert_eq!(policy.clamp(-10), 0);
        assert_eq!(policy.clamp(40), 40);
        assert_eq!(policy.clamp(120), 80);
    }

    #[test]
    fn test_zone_state_serializes_mode_lowercase() {
        let state = ZoneState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["mode"], "stop");
    }
}
