//! Queue items, repeat modes, and queue authority.

use serde::{Deserialize, Serialize};

use crate::zone::AudioType;

/// One entry of a zone queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub audiopath: String,
    pub audiotype: AudioType,
    pub cover: Option<String>,
    /// Duration in seconds, `0` when unknown.
    pub duration: u64,
    pub station: Option<String>,
    pub title: Option<String>,
    /// Stable identity of the item within the queue.
    pub unique_id: String,
    /// Provider account the item belongs to, when relevant.
    pub user: Option<String>,
    /// Position of the item before any shuffle, used for restoration.
    pub original_index: usize,
    /// Current position assigned by the queue.
    pub qindex: usize,
}

impl QueueItem {
    /// Minimal item carrying only an audiopath; the rest is filled from
    /// resolved metadata.
    pub fn from_audiopath(audiopath: impl Into<String>) -> Self {
        let audiopath = audiopath.into();
        Self {
            album: None,
            artist: None,
            unique_id: audiopath.clone(),
            audiopath,
            audiotype: AudioType::Music,
            cover: None,
            duration: 0,
            station: None,
            title: None,
            user: None,
            original_index: 0,
            qindex: 0,
        }
    }
}

/// Repeat mode, with the wire values the upstream controller expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl From<RepeatMode> for u8 {
    fn from(mode: RepeatMode) -> u8 {
        match mode {
            RepeatMode::Off => 0,
            RepeatMode::All => 1,
            RepeatMode::One => 3,
        }
    }
}

impl TryFrom<u8> for RepeatMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RepeatMode::Off),
            1 => Ok(RepeatMode::All),
            3 => Ok(RepeatMode::One),
            other => Err(format!("invalid repeat mode {}", other)),
        }
    }
}

impl RepeatMode {
    /// Cycle order used by the `repeat` command: off → all → one → off.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// Who drives queue advancement.
///
/// With `Local` authority the core steps the queue on end-of-track. With a
/// remote authority the external provider owns progression and the core
/// mirrors its snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "provider")]
pub enum QueueAuthority {
    #[default]
    Local,
    Remote(String),
}

impl QueueAuthority {
    pub fn is_local(&self) -> bool {
        matches!(self, QueueAuthority::Local)
    }

    /// Tag carried in the zone state (`local` or the provider name).
    pub fn tag(&self) -> &str {
        match self {
            QueueAuthority::Local => "local",
            QueueAuthority::Remote(provider) => provider,
        }
    }
}
