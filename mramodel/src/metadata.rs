//! Track metadata and cover-art payloads.

use serde::{Deserialize, Serialize};

/// Rich metadata for the current track.
///
/// Partial updates coming from input adapters merge field-wise: a `None`
/// in the update leaves the existing value untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover: Option<String>,
    /// Track duration in seconds. `0` means unknown or endless (radio).
    pub duration: Option<u64>,
    pub station: Option<String>,
}

impl TrackMetadata {
    /// Merges a partial update into `self`, keeping existing values where
    /// the update carries none.
    pub fn merge(&mut self, update: &TrackMetadata) {
        if update.title.is_some() {
            self.title = update.title.clone();
        }
        if update.artist.is_some() {
            self.artist = update.artist.clone();
        }
        if update.album.is_some() {
            self.album = update.album.clone();
        }
        if update.cover.is_some() {
            self.cover = update.cover.clone();
        }
        if update.duration.is_some() {
            self.duration = update.duration;
        }
        if update.station.is_some() {
            self.station = update.station.clone();
        }
    }

    /// True if the metadata carries a positive, finite duration.
    pub fn has_positive_duration(&self) -> bool {
        self.duration.map(|d| d > 0).unwrap_or(false)
    }
}

/// Raw cover art handed over by an input adapter.
///
/// The core stores the bytes behind an internal HTTP URL; renderers that
/// need URL-based artwork receive that URL.
#[derive(Clone, Debug)]
pub struct CoverArtPayload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut base = TrackMetadata {
            title: Some("Song".into()),
            artist: Some("Artist".into()),
            ..Default::default()
        };
        let update = TrackMetadata {
            artist: Some("Other".into()),
            duration: Some(200),
            ..Default::default()
        };
        base.merge(&update);
        assert_eq!(base.title.as_deref(), Some("Song"));
        assert_eq!(base.artist.as_deref(), Some("Other"));
        assert_eq!(base.duration, Some(200));
    }

    #[test]
    fn test_positive_duration() {
        let mut meta = TrackMetadata::default();
        assert!(!meta.has_positive_duration());
        meta.duration = Some(0);
        assert!(!meta.has_positive_duration());
        meta.duration = Some(1);
        assert!(meta.has_positive_duration());
    }
}
