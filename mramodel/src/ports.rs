//! Ports towards external collaborators.
//!
//! Only the core's side of each contract is defined here. Providers, input
//! receivers, the WebSocket notifier, and the persistence layer live outside
//! the core and implement these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::events::NotifierEvent;
use crate::metadata::TrackMetadata;
use crate::queue_item::QueueItem;
use crate::source::{PlaybackSource, PreferredOutput};
use crate::zone::ZoneId;

/// Failure of a port call.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },
    #[error("port unavailable: {0}")]
    Unavailable(String),
    #[error("io: {0}")]
    Io(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Metadata resolved for a single audiopath.
#[derive(Clone, Debug, Default)]
pub struct ResolvedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub duration: Option<u64>,
    pub audiopath: String,
    pub track_id: Option<String>,
}

impl ResolvedMetadata {
    pub fn into_track_metadata(self) -> TrackMetadata {
        TrackMetadata {
            title: self.title,
            artist: self.artist,
            album: self.album,
            cover: self.cover_url,
            duration: self.duration,
            station: None,
        }
    }
}

/// Request for a concrete playback source.
#[derive(Clone, Debug)]
pub struct SourceRequest {
    pub audiopath: String,
    pub seek_ms: Option<u64>,
    pub account_id: Option<String>,
    pub preferred: PreferredOutput,
}

/// Result of source resolution: the source (when the provider can deliver
/// one) and the provider tag that answered.
#[derive(Clone, Debug)]
pub struct ResolvedSource {
    pub playback_source: Option<PlaybackSource>,
    pub provider: String,
}

/// Request to expand a URI into queue items.
#[derive(Clone, Debug)]
pub struct QueueBuildRequest {
    pub uri: String,
    pub zone_name: String,
    pub station: Option<String>,
    pub raw_audiopath: Option<String>,
    /// Upper bound on the items resolved synchronously; larger containers
    /// are completed by a background fill.
    pub limit: Option<usize>,
}

/// Content resolution: providers, library, radio directories.
#[async_trait]
pub trait ContentPort: Send + Sync {
    async fn resolve_metadata(&self, audiopath: &str) -> Result<Option<ResolvedMetadata>, PortError>;

    async fn resolve_playback_source(&self, request: &SourceRequest) -> Result<ResolvedSource, PortError>;

    async fn build_queue_for_uri(&self, request: &QueueBuildRequest) -> Result<Vec<QueueItem>, PortError>;

    async fn get_media_folder(
        &self,
        folder_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>, PortError>;

    async fn get_service_track(
        &self,
        service: &str,
        user: &str,
        track_id: &str,
    ) -> Result<Option<ResolvedMetadata>, PortError>;

    async fn get_service_folder(
        &self,
        service: &str,
        user: &str,
        folder_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>, PortError>;

    fn is_apple_music_provider(&self, id: &str) -> bool;
    fn is_deezer_provider(&self, id: &str) -> bool;
    fn is_tidal_provider(&self, id: &str) -> bool;
}

/// External input sessions (AirPlay / Spotify Connect receivers, Music
/// Assistant, line-in).
#[async_trait]
pub trait InputsPort: Send + Sync {
    /// Stops the session of `label` on `zone`, with a reason token the
    /// adapter may forward to the remote peer.
    async fn stop_session(&self, zone_id: ZoneId, label: &str, reason: &str) -> Result<(), PortError>;

    async fn pause_session(&self, zone_id: ZoneId, label: &str) -> Result<(), PortError>;

    async fn resume_session(&self, zone_id: ZoneId, label: &str) -> Result<(), PortError>;

    /// Asks the adapter for a playback source for a URI it owns
    /// (Spotify offload, Music Assistant proxy).
    async fn resolve_input_source(
        &self,
        zone_id: ZoneId,
        label: &str,
        uri: &str,
    ) -> Result<Option<PlaybackSource>, PortError>;

    /// Forwards a remote-control command (next/previous/seek) to the
    /// external session.
    async fn forward_command(
        &self,
        zone_id: ZoneId,
        label: &str,
        command: &str,
        value: Option<i64>,
    ) -> Result<(), PortError>;

    /// Propagates a zone rename to adapters that advertise per-zone names.
    async fn sync_zone_name(&self, zone_id: ZoneId, name: &str) -> Result<(), PortError>;

    /// Requests control of the line-in hardware for a zone.
    async fn request_linein(&self, zone_id: ZoneId, enable: bool) -> Result<(), PortError>;
}

/// One-way notification sink; must never block beyond an enqueue.
pub trait NotifierPort: Send + Sync {
    fn notify(&self, event: NotifierEvent);
}

/// Persisted JSON blobs (favorites, recents, custom radios).
#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn load_blob(&self, key: &str) -> Result<Option<serde_json::Value>, PortError>;
    async fn save_blob(&self, key: &str, value: &serde_json::Value) -> Result<(), PortError>;
}
