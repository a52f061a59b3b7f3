//! End-to-end coordinator scenarios against mock ports.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mracontrol::{InputAdapters, PlayOptions, ZoneConfig, ZoneRepository, ZoneRepositoryBuilder, ZoneStorage};
use mracovers::CoverStore;
use mraengine::{AudioEngine, EngineOptions};
use mramodel::{
    ContentPort, InputsPort, NotifierEvent, NotifierPort, PlaybackMode, PlaybackSource, PortError,
    PreferredOutput, QueueBuildRequest, QueueItem, ResolvedMetadata, ResolvedSource, SourceRequest,
    StoragePort, TrackMetadata, VolumePolicy, ZoneId,
};
use mraoutputs::{OutputError, ZoneOutput};

// ===== mock ports =====

#[derive(Default)]
struct MockContent {
    /// Queue items served per requested uri.
    queues: Mutex<HashMap<String, Vec<QueueItem>>>,
    build_calls: Mutex<Vec<String>>,
    source_requests: Mutex<Vec<SourceRequest>>,
    /// Backing file every resolved source points at.
    media_path: std::path::PathBuf,
}

impl MockContent {
    fn new(media_path: std::path::PathBuf) -> Self {
        Self {
            media_path,
            ..Default::default()
        }
    }

    fn serve_queue(&self, uri: &str, items: Vec<QueueItem>) {
        self.queues.lock().unwrap().insert(uri.to_string(), items);
    }

    fn build_calls(&self) -> usize {
        self.build_calls.lock().unwrap().len()
    }

    fn last_source_request(&self) -> Option<SourceRequest> {
        self.source_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ContentPort for MockContent {
    async fn resolve_metadata(&self, _audiopath: &str) -> Result<Option<ResolvedMetadata>, PortError> {
        Ok(None)
    }

    async fn resolve_playback_source(
        &self,
        request: &SourceRequest,
    ) -> Result<ResolvedSource, PortError> {
        self.source_requests.lock().unwrap().push(request.clone());
        Ok(ResolvedSource {
            playback_source: Some(PlaybackSource::File {
                path: self.media_path.clone(),
            }),
            provider: "library".to_string(),
        })
    }

    async fn build_queue_for_uri(
        &self,
        request: &QueueBuildRequest,
    ) -> Result<Vec<QueueItem>, PortError> {
        self.build_calls.lock().unwrap().push(request.uri.clone());
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get(&request.uri)
            .cloned()
            .unwrap_or_default())
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

#[derive(Default)]
struct MockInputs {
    stops: Mutex<Vec<(String, String)>>,
}

impl MockInputs {
    fn stops_for(&self, label: &str) -> Vec<String> {
        self.stops
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl InputsPort for MockInputs {
    async fn stop_session(&self, _zone_id: ZoneId, label: &str, reason: &str) -> Result<(), PortError> {
        self.stops
            .lock()
            .unwrap()
            .push((label.to_string(), reason.to_string()));
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
        _zone_id: ZoneId,
        _label: &str,
        _command: &str,
        _value: Option<i64>,
    ) -> Result<(), PortError> {
        Ok(())
    }

    async fn sync_zone_name(&self, _zone_id: ZoneId, _name: &str) -> Result<(), PortError> {
        Ok(())
    }

    async fn request_linein(&self, _zone_id: ZoneId, _enable: bool) -> Result<(), PortError> {
        Ok(())
    }
}

#[derive(Default)]
struct CollectingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
}

impl CollectingNotifier {
    fn queue_updates(&self) -> Vec<(usize, usize)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                NotifierEvent::QueueUpdated {
                    queue_size,
                    current_index,
                    ..
                } => Some((*queue_size, *current_index)),
                _ => None,
            })
            .collect()
    }
}

impl NotifierPort for CollectingNotifier {
    fn notify(&self, event: NotifierEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct MemoryStorage {
    blobs: Mutex<HashMap<String, serde_json::Value>>,
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn load_blob(&self, key: &str) -> Result<Option<serde_json::Value>, PortError> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn save_blob(&self, key: &str, value: &serde_json::Value) -> Result<(), PortError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingOutput {
    plays: Mutex<Vec<String>>,
    stops: Mutex<u32>,
}

#[async_trait]
impl ZoneOutput for RecordingOutput {
    fn type_name(&self) -> &str {
        "recording"
    }

    async fn play(&self, session: &mramodel::PlaybackSession) -> Result<(), OutputError> {
        self.plays
            .lock()
            .unwrap()
            .push(session.metadata.title.clone().unwrap_or_default());
        Ok(())
    }

    async fn pause(&self, _session: &mramodel::PlaybackSession) -> Result<(), OutputError> {
        Ok(())
    }

    async fn resume(&self, _session: &mramodel::PlaybackSession) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self, _session: Option<&mramodel::PlaybackSession>) -> Result<(), OutputError> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }

    async fn set_volume(&self, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }

    fn preferred_output(&self) -> Option<PreferredOutput> {
        Some(PreferredOutput {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 64 * 1024,
        })
    }
}

// ===== harness =====

struct Harness {
    repo: Arc<ZoneRepository>,
    content: Arc<MockContent>,
    inputs: Arc<MockInputs>,
    notifier: Arc<CollectingNotifier>,
    output: Arc<RecordingOutput>,
    _covers_dir: tempfile::TempDir,
    _media: tempfile::NamedTempFile,
}

impl Harness {
    fn new(pump_engine: bool) -> Self {
        let mut media = tempfile::NamedTempFile::new().unwrap();
        media.write_all(&vec![0x55u8; 8 * 1024]).unwrap();
        media.flush().unwrap();

        let covers_dir = tempfile::tempdir().unwrap();
        let covers = CoverStore::open(covers_dir.path(), "http://127.0.0.1:7091").unwrap();

        let content = Arc::new(MockContent::new(media.path().to_path_buf()));
        let inputs = Arc::new(MockInputs::default());
        let notifier = Arc::new(CollectingNotifier::default());
        let storage_port = Arc::new(MemoryStorage::default());
        let storage = Arc::new(ZoneStorage::new(storage_port, notifier.clone()));

        let (engine, engine_events) = AudioEngine::new(EngineOptions::default());

        let repo = ZoneRepositoryBuilder {
            engine,
            content: content.clone(),
            inputs: inputs.clone(),
            notifier: notifier.clone(),
            storage,
            covers,
            spotify_offload_enabled: false,
            dispatch_timeout: Duration::from_secs(2),
            handoff_timeout_ms: 2000,
        }
        .build();

        if pump_engine {
            repo.pump_engine_events(engine_events);
        }

        let output = Arc::new(RecordingOutput::default());
        repo.spawn_zone(
            ZoneConfig {
                id: ZoneId(1),
                name: "Living Room".to_string(),
                source_mac: "aa:bb:cc:dd:ee:01".to_string(),
                volume_policy: VolumePolicy::default(),
                enabled_inputs: vec!["airplay".into(), "spotify".into()],
            },
            vec![output.clone()],
        );

        Self {
            repo,
            content,
            inputs,
            notifier,
            output,
            _covers_dir: covers_dir,
            _media: media,
        }
    }

    fn zone(&self) -> mracontrol::ZoneHandle {
        self.repo.zone(ZoneId(1)).unwrap()
    }

    fn library_queue(&self) -> Vec<QueueItem> {
        ["one", "two", "three"]
            .iter()
            .map(|name| {
                let mut item = QueueItem::from_audiopath(format!("library:track:{name}"));
                item.unique_id = format!("id-{name}");
                item.title = Some(name.to_string());
                item
            })
            .collect()
    }
}

async fn wait_for<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_until_mode(zone: &mracontrol::ZoneHandle, mode: PlaybackMode, what: &str) {
    for _ in 0..100 {
        if zone.state().await.map(|s| s.mode == mode).unwrap_or(false) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

// ===== scenarios =====

/// S1: a play request matching an item already in the queue seeks within
/// it instead of rebuilding.
#[tokio::test]
async fn seek_within_existing_queue() {
    let harness = Harness::new(false);
    let zone = harness.zone();

    harness
        .content
        .serve_queue("library:album:test", harness.library_queue());
    zone.play_content("library:album:test", PlayOptions::default())
        .await
        .unwrap();
    wait_for(
        || harness.content.build_calls() == 1,
        "initial queue build",
    )
    .await;

    let state = zone.state().await.unwrap();
    assert_eq!(state.mode, PlaybackMode::Play);
    assert_eq!(state.qindex, 0);

    zone.play_content("library:track:three", PlayOptions::default())
        .await
        .unwrap();

    wait_for(
        || {
            harness
                .notifier
                .queue_updates()
                .iter()
                .any(|(size, index)| *size == 3 && *index == 2)
        },
        "seek notification",
    )
    .await;

    // No rebuild happened: the one initial build call stands.
    assert_eq!(harness.content.build_calls(), 1);
    let state = zone.state().await.unwrap();
    assert_eq!(state.qindex, 2);
    assert_eq!(state.audiopath, "library:track:three");
}

/// S3: switching from an external Spotify session to the local queue
/// stops the Spotify session exactly once with reason `switch_to_queue`,
/// and stale Spotify callbacks are dropped afterwards.
#[tokio::test]
async fn provider_switch_stops_spotify_once() {
    let harness = Harness::new(false);
    let zone = harness.zone();
    let adapters = InputAdapters::new(harness.repo.clone());

    // Spotify Connect session owns the zone.
    adapters
        .start_playback(
            ZoneId(1),
            "spotify",
            PlaybackSource::File {
                path: harness._media.path().to_path_buf(),
            },
            Some(TrackMetadata {
                title: Some("spotify song".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    wait_until_mode(&zone, PlaybackMode::Play, "spotify session playing").await;

    // Switch to a local library queue.
    harness
        .content
        .serve_queue("library:album:test", harness.library_queue());
    zone.play_content("library:album:test", PlayOptions::default())
        .await
        .unwrap();
    wait_for(
        || harness.inputs.stops_for("spotify").len() == 1,
        "spotify stop",
    )
    .await;

    assert_eq!(
        harness.inputs.stops_for("spotify"),
        vec!["switch_to_queue".to_string()]
    );

    // A stale Spotify metadata callback must not mutate state.
    let before = zone.state().await.unwrap();
    adapters
        .update_metadata(
            ZoneId(1),
            "spotify",
            TrackMetadata {
                title: Some("poisoned".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let after = zone.state().await.unwrap();
    assert_eq!(after.metadata.title, before.metadata.title);
    assert_ne!(after.metadata.title.as_deref(), Some("poisoned"));

    // Still exactly one stop.
    assert_eq!(harness.inputs.stops_for("spotify").len(), 1);
}

/// S4: an HTTP stream without a positive duration is classified as radio,
/// gets the small prebuffer, and pins time/duration to zero.
#[tokio::test]
async fn radio_http_stream_classification() {
    let harness = Harness::new(false);
    let zone = harness.zone();

    zone.play_content(
        "http://example.com/stream.mp3",
        PlayOptions {
            content_type: "play".to_string(),
            metadata: Some(TrackMetadata {
                title: Some("t".into()),
                duration: Some(0),
                ..Default::default()
            }),
            station: None,
        },
    )
    .await
    .unwrap();

    wait_for(
        || harness.content.last_source_request().is_some(),
        "source resolution",
    )
    .await;

    let request = harness.content.last_source_request().unwrap();
    assert_eq!(request.preferred.prebuffer_bytes, 8 * 1024);

    let state = zone.state().await.unwrap();
    assert_eq!(state.mode, PlaybackMode::Play);
    assert_eq!(state.audio_type, mramodel::AudioType::Radio);
    assert_eq!(state.time, 0);
    assert_eq!(state.metadata.duration, Some(0));
}

/// S5: end-of-track under local authority advances through the queue and
/// stops with the queue exhausted.
#[tokio::test]
async fn end_of_track_advances_local_queue() {
    let harness = Harness::new(true);
    let zone = harness.zone();

    let items: Vec<QueueItem> = ["a", "b"]
        .iter()
        .map(|name| {
            let mut item = QueueItem::from_audiopath(format!("library:track:{name}"));
            item.unique_id = format!("id-{name}");
            item.title = Some(name.to_string());
            item
        })
        .collect();
    harness.content.serve_queue("library:album:short", items);

    zone.play_content("library:album:short", PlayOptions::default())
        .await
        .unwrap();

    // The tiny backing file drains immediately: the engine reports track
    // end, the coordinator advances to "b", then stops at queue end.
    wait_until_mode(&zone, PlaybackMode::Stop, "queue drained to stop").await;

    let view = zone.queue_view(0, 0).await.unwrap();
    assert_eq!(view.total, 2);
    assert_eq!(view.current_index, 1);

    // Both tracks reached the output.
    let plays = harness.output.plays.lock().unwrap().clone();
    assert!(plays.contains(&"a".to_string()));
    assert!(plays.contains(&"b".to_string()));
}

/// Remote queue authority: end-of-track is an echo, never a local advance.
#[tokio::test]
async fn end_of_track_remote_authority_is_echo_only() {
    let harness = Harness::new(false);
    let zone = harness.zone();
    let adapters = InputAdapters::new(harness.repo.clone());

    let items: Vec<QueueItem> = ["x", "y"]
        .iter()
        .map(|name| QueueItem::from_audiopath(format!("musicassistant:track:{name}")))
        .collect();
    harness.content.serve_queue("musicassistant:playlist:p", items);

    zone.play_content("musicassistant:playlist:p", PlayOptions::default())
        .await
        .unwrap();
    wait_until_mode(&zone, PlaybackMode::Play, "music assistant playing").await;

    let before = zone.queue_view(0, 0).await.unwrap();
    assert_eq!(before.authority.tag(), "musicassistant");

    adapters
        .end_of_track(ZoneId(1), "musicassistant")
        .await
        .unwrap();

    let after = zone.queue_view(0, 0).await.unwrap();
    assert_eq!(after.current_index, before.current_index);
    let state = zone.state().await.unwrap();
    assert_eq!(state.mode, PlaybackMode::Play);

    // S2: re-requesting the target the external input already plays is a
    // no-op: no rebuild, no session churn.
    let builds = harness.content.build_calls();
    let stops = harness.inputs.stops_for("musicassistant").len();
    zone.play_content(state.audiopath.clone(), PlayOptions::default())
        .await
        .unwrap();
    let settled = zone.state().await.unwrap();
    assert_eq!(harness.content.build_calls(), builds);
    assert_eq!(harness.inputs.stops_for("musicassistant").len(), stops);
    assert_eq!(settled.audiopath, state.audiopath);
}

/// Shuffle round-trip through the command surface preserves the playing
/// item and restores the original order.
#[tokio::test]
async fn shuffle_roundtrip_preserves_current() {
    let harness = Harness::new(false);
    let zone = harness.zone();

    let items: Vec<QueueItem> = (0..12)
        .map(|i| QueueItem::from_audiopath(format!("library:track:{i}")))
        .collect();
    harness.content.serve_queue("library:album:big", items);

    zone.play_content("library:album:big", PlayOptions::default())
        .await
        .unwrap();
    wait_until_mode(&zone, PlaybackMode::Play, "playing").await;

    let original: Vec<String> = zone
        .queue_view(0, 0)
        .await
        .unwrap()
        .items
        .iter()
        .map(|i| i.unique_id.clone())
        .collect();
    let current = zone.state().await.unwrap().qid;

    zone.command(mracontrol::ZoneCommand::parse("shuffle", Some("on")).unwrap())
        .await
        .unwrap();
    let shuffled = zone.queue_view(0, 0).await.unwrap();
    assert!(shuffled.shuffle);
    assert_eq!(shuffled.items[shuffled.current_index].unique_id, current);

    zone.command(mracontrol::ZoneCommand::parse("shuffle", Some("off")).unwrap())
        .await
        .unwrap();
    let restored: Vec<String> = zone
        .queue_view(0, 0)
        .await
        .unwrap()
        .items
        .iter()
        .map(|i| i.unique_id.clone())
        .collect();
    assert_eq!(restored, original);
}

/// A zone without renderable outputs refuses to play and reports
/// `no_output_configured`.
#[tokio::test]
async fn no_output_configured_failure() {
    let harness = Harness::new(false);

    let zone = harness.repo.spawn_zone(
        ZoneConfig {
            id: ZoneId(7),
            name: "Bare".to_string(),
            source_mac: String::new(),
            volume_policy: VolumePolicy::default(),
            enabled_inputs: Vec::new(),
        },
        Vec::new(),
    );

    harness
        .content
        .serve_queue("library:album:test", harness.library_queue());
    zone.play_content("library:album:test", PlayOptions::default())
        .await
        .unwrap();

    wait_for(
        || {
            harness
                .notifier
                .events
                .lock()
                .unwrap()
                .iter()
                .any(|event| {
                    matches!(
                        event,
                        NotifierEvent::PlaybackFailed { zone_id, reason }
                            if *zone_id == ZoneId(7) && reason == "no_output_configured"
                    )
                })
        },
        "no-output failure event",
    )
    .await;

    let state = zone.state().await.unwrap();
    assert_eq!(state.mode, PlaybackMode::Stop);
}
