//! Built-in port implementations for standalone operation.
//!
//! Real deployments plug content providers, input receivers, and the
//! WebSocket notifier in from the outside; these implementations keep the
//! daemon functional without them: HTTP/file sources play directly,
//! notifications go to the log, and storage persists to JSON files under
//! the config directory.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use mramodel::{
    ContentPort, InputsPort, NotifierEvent, NotifierPort, PlaybackSource, PortError, Provider,
    QueueBuildRequest, QueueItem, ResolvedMetadata, ResolvedSource, SourceRequest, StoragePort,
    ZoneId,
};

/// Direct content resolution for URLs and local files.
pub struct DirectContent;

#[async_trait]
impl ContentPort for DirectContent {
    async fn resolve_metadata(&self, _audiopath: &str) -> Result<Option<ResolvedMetadata>, PortError> {
        Ok(None)
    }

    async fn resolve_playback_source(
        &self,
        request: &SourceRequest,
    ) -> Result<ResolvedSource, PortError> {
        let audiopath = request.audiopath.as_str();
        let provider = Provider::classify(audiopath);

        let playback_source = match provider {
            Provider::HttpUrl => Some(PlaybackSource::http(audiopath)),
            Provider::Library => {
                // library:track:<path> points at a file on disk.
                audiopath
                    .splitn(3, ':')
                    .nth(2)
                    .map(|path| PlaybackSource::File {
                        path: PathBuf::from(path),
                    })
            }
            _ => None,
        };

        Ok(ResolvedSource {
            playback_source,
            provider: provider.prefix().to_string(),
        })
    }

    async fn build_queue_for_uri(
        &self,
        request: &QueueBuildRequest,
    ) -> Result<Vec<QueueItem>, PortError> {
        // Without an external library provider a URI expands to itself.
        Ok(vec![QueueItem::from_audiopath(request.uri.clone())])
    }

    async fn get_media_folder(
        &self,
        _folder_id: &str,
        _offset: usize,
        _limit: usize,
    ) -> Result<Vec<QueueItem>, PortError> {
        Ok(Vec::new())
    }

    async fn get_service_track(
        &self,
        _service: &str,
        _user: &str,
        _track_id: &str,
    ) -> Result<Option<ResolvedMetadata>, PortError> {
        Ok(None)
    }

    async fn get_service_folder(
        &self,
        _service: &str,
        _user: &str,
        _folder_id: &str,
        _offset: usize,
        _limit: usize,
    ) -> Result<Vec<QueueItem>, PortError> {
        Ok(Vec::new())
    }

    fn is_apple_music_provider(&self, id: &str) -> bool {
        id.starts_with("applemusic")
    }

    fn is_deezer_provider(&self, id: &str) -> bool {
        id.starts_with("deezer")
    }

    fn is_tidal_provider(&self, id: &str) -> bool {
        id.starts_with("tidal")
    }
}

/// Input port used until real receivers register; every call is a logged
/// no-op.
pub struct LoggingInputs;

#[async_trait]
impl InputsPort for LoggingInputs {
    async fn stop_session(&self, zone_id: ZoneId, label: &str, reason: &str) -> Result<(), PortError> {
        debug!(zone = %zone_id, label, reason, "input session stop (no receiver bound)");
        Ok(())
    }

    async fn pause_session(&self, _zone_id: ZoneId, _label: &str) -> Result<(), PortError> {
        Ok(())
    }

    async fn resume_session(&self, _zone_id: ZoneId, _label: &str) -> Result<(), PortError> {
        Ok(())
    }

    async fn resolve_input_source(
        &self,
        _zone_id: ZoneId,
        _label: &str,
        _uri: &str,
    ) -> Result<Option<PlaybackSource>, PortError> {
        Ok(None)
    }

    async fn forward_command(
        &self,
        zone_id: ZoneId,
        label: &str,
        command: &str,
        value: Option<i64>,
    ) -> Result<(), PortError> {
        debug!(zone = %zone_id, label, command, ?value, "input command (no receiver bound)");
        Ok(())
    }

    async fn sync_zone_name(&self, _zone_id: ZoneId, _name: &str) -> Result<(), PortError> {
        Ok(())
    }

    async fn request_linein(&self, _zone_id: ZoneId, _enable: bool) -> Result<(), PortError> {
        Ok(())
    }
}

/// Notifier that writes every event as a structured log line.
pub struct LogNotifier;

impl NotifierPort for LogNotifier {
    fn notify(&self, event: NotifierEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "mraudio::notifier", %payload, "event"),
            Err(e) => debug!(error = %e, "unserializable notifier event"),
        }
    }
}

/// JSON-file storage under the config directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace([':', '/'], "_");
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StoragePort for FileStorage {
    async fn load_blob(&self, key: &str) -> Result<Option<serde_json::Value>, PortError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PortError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Io(e.to_string())),
        }
    }

    async fn save_blob(&self, key: &str, value: &serde_json::Value) -> Result<(), PortError> {
        let path = self.path_for(key);
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| PortError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PortError::Io(e.to_string()))
    }
}
