//! The engine façade: session registry, start/stop, handoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mramodel::{PlaybackSession, PlaybackSource, PreferredOutput, SessionState, StreamProfile, TrackMetadata, ZoneId};

use crate::error::EngineError;
use crate::pipes::PcmPipes;
use crate::session::{SessionConfig, SessionOutcome, SubscriberStream, ZoneSession};
use crate::stats::SessionStats;

/// Grace period between the new pipeline reaching first-chunk and the old
/// one being cancelled, letting in-flight reads complete.
const HANDOFF_GRACE_MS: u64 = 50;

/// Engine-wide tunables, from configuration.
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub ring_chunks: usize,
    pub prime_bytes: usize,
    pub first_chunk_timeout_ms: u64,
    pub handoff_timeout_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ring_chunks: 128,
            prime_bytes: 128 * 1024,
            first_chunk_timeout_ms: 6000,
            handoff_timeout_ms: 4000,
        }
    }
}

/// Parameters of one pipeline start.
#[derive(Clone, Debug)]
pub struct StartOptions {
    pub zone_id: ZoneId,
    pub source: PlaybackSource,
    pub profiles: Vec<StreamProfile>,
    pub preferred: PreferredOutput,
    /// Origin label carried into the session ("queue", "airplay", ...).
    pub label: String,
    pub metadata: TrackMetadata,
}

/// Handoff behavior for [`AudioEngine::start_with_handoff`].
#[derive(Clone, Copy, Debug)]
pub struct HandoffOptions {
    pub timeout_ms: u64,
}

/// Subscriber attachment options.
#[derive(Clone, Debug, Default)]
pub struct SubscriberOptions {
    /// Replay the rolling backlog before live data (late joiners).
    pub prime_with_buffer: bool,
    pub label: String,
}

/// Event published when a pipeline ends on its own.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// The source reached EOF and all data was published.
    Ended { zone_id: ZoneId, label: String },
    /// The source failed.
    Failed {
        zone_id: ZoneId,
        label: String,
        message: String,
    },
}

/// The per-zone pipeline registry.
///
/// A zone has at most one active session, except during the overlap window
/// of a handoff where the successor primes before the predecessor exits.
pub struct AudioEngine {
    options: EngineOptions,
    sessions: Mutex<HashMap<ZoneId, Arc<ZoneSession>>>,
    pipes: PcmPipes,
    events_tx: mpsc::Sender<EngineEvent>,
    restarts: Mutex<HashMap<ZoneId, u32>>,
}

impl AudioEngine {
    /// Creates the engine and the event stream its sessions report on.
    pub fn new(options: EngineOptions) -> (Arc<Self>, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        (
            Arc::new(Self {
                options,
                sessions: Mutex::new(HashMap::new()),
                pipes: PcmPipes::new(),
                events_tx,
                restarts: Mutex::new(HashMap::new()),
            }),
            events_rx,
        )
    }

    /// Writer registry for in-process PCM pipes.
    pub fn pipes(&self) -> &PcmPipes {
        &self.pipes
    }

    fn spawn_session(&self, options: &StartOptions) -> Arc<ZoneSession> {
        let config = SessionConfig {
            profiles: options.profiles.clone(),
            prebuffer_bytes: options.preferred.prebuffer_bytes,
            prime_bytes: self.options.prime_bytes,
        };
        ZoneSession::spawn(
            options.zone_id,
            options.label.clone(),
            options.source.clone(),
            config,
            self.pipes.clone(),
        )
    }

    fn watch_outcome(&self, session: &Arc<ZoneSession>) {
        let session = session.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = session.wait_outcome().await;
            if session.token.is_cancelled() {
                // Externally stopped or retired by a handoff; not an event.
                return;
            }
            let event = match outcome {
                SessionOutcome::Ended => EngineEvent::Ended {
                    zone_id: session.zone_id,
                    label: session.label.clone(),
                },
                SessionOutcome::Failed(e) => EngineEvent::Failed {
                    zone_id: session.zone_id,
                    label: session.label.clone(),
                    message: e.to_string(),
                },
            };
            let _ = events.send(event).await;
        });
    }

    fn describe(&self, options: &StartOptions, session: &Arc<ZoneSession>) -> PlaybackSession {
        let now = Utc::now();
        PlaybackSession {
            zone_id: options.zone_id,
            source: options.label.clone(),
            metadata: options.metadata.clone(),
            streams: session.streams.clone(),
            pcm_stream: session
                .streams
                .iter()
                .find(|s| s.url.ends_with("/pcm"))
                .cloned(),
            state: SessionState::Playing,
            elapsed: 0,
            duration: options.metadata.duration.unwrap_or(0),
            started_at: now,
            updated_at: now,
            playback_source: options.source.clone(),
        }
    }

    /// Starts a pipeline, replacing any existing session for the zone
    /// immediately (no overlap).
    pub async fn start(&self, options: StartOptions) -> Result<PlaybackSession, EngineError> {
        let session = self.spawn_session(&options);
        self.watch_outcome(&session);
        let old = self
            .sessions
            .lock()
            .unwrap()
            .insert(options.zone_id, session.clone());
        if let Some(old) = old {
            old.cancel(true);
        }
        info!(zone = %options.zone_id, label = %options.label, "pipeline started");
        Ok(self.describe(&options, &session))
    }

    /// Starts a pipeline with handoff: the new pipeline must reach first
    /// encoded chunk before the previous one is allowed to exit. On
    /// timeout the NEW pipeline is retired and the old one is preserved.
    pub async fn start_with_handoff(
        &self,
        options: StartOptions,
        handoff: Option<HandoffOptions>,
    ) -> Result<PlaybackSession, EngineError> {
        let has_previous = self.has_session(options.zone_id);
        if !has_previous {
            return self.start(options).await;
        }

        let timeout_ms = handoff
            .map(|h| h.timeout_ms)
            .unwrap_or(self.options.handoff_timeout_ms);

        // The successor's outcome watcher only attaches after a successful
        // swap: a failed handoff must never surface as a zone failure while
        // the previous pipeline keeps playing.
        let successor = self.spawn_session(&options);
        if let Err(e) = successor.wait_first_chunk(timeout_ms).await {
            warn!(zone = %options.zone_id, error = %e, "handoff failed, keeping previous pipeline");
            successor.cancel(true);
            return Err(EngineError::HandoffFailed {
                zone: options.zone_id,
                message: e.to_string(),
            });
        }
        self.watch_outcome(&successor);

        let old = self
            .sessions
            .lock()
            .unwrap()
            .insert(options.zone_id, successor.clone());

        if let Some(old) = old {
            tokio::time::sleep(tokio::time::Duration::from_millis(HANDOFF_GRACE_MS)).await;
            old.cancel(true);
        }

        *self
            .restarts
            .lock()
            .unwrap()
            .entry(options.zone_id)
            .or_insert(0) += 1;

        debug!(zone = %options.zone_id, "handoff complete");
        Ok(self.describe(&options, &successor))
    }

    /// Attaches a subscriber to a sub-stream of the zone's session.
    pub fn create_stream(
        &self,
        zone_id: ZoneId,
        profile: StreamProfile,
        options: SubscriberOptions,
    ) -> Result<SubscriberStream, EngineError> {
        let session = self.session(zone_id)?;
        session.attach_subscriber(
            profile,
            &options.label,
            options.prime_with_buffer,
            self.options.ring_chunks,
        )
    }

    /// Tears the zone's pipeline down.
    pub fn stop(&self, zone_id: ZoneId, reason: Option<&str>, discard_subscribers: bool) {
        let removed = self.sessions.lock().unwrap().remove(&zone_id);
        if let Some(session) = removed {
            info!(zone = %zone_id, reason = reason.unwrap_or("unspecified"), "pipeline stopped");
            session.cancel(discard_subscribers);
            if let PlaybackSource::PcmPipe { label } = &session.source {
                self.pipes.close(label);
            }
        }
    }

    /// Awaits first encoded output of `profile` for the zone.
    pub async fn wait_for_first_chunk(
        &self,
        zone_id: ZoneId,
        profile: StreamProfile,
        timeout_ms: Option<u64>,
    ) -> Result<(), EngineError> {
        let session = self.session(zone_id)?;
        if !session.has_profile(profile) {
            return Err(EngineError::NoProfile(zone_id, profile));
        }
        session
            .wait_first_chunk(timeout_ms.unwrap_or(self.options.first_chunk_timeout_ms))
            .await
    }

    pub fn has_session(&self, zone_id: ZoneId) -> bool {
        self.sessions.lock().unwrap().contains_key(&zone_id)
    }

    /// Statistics of the zone's session.
    pub fn session_stats(&self, zone_id: ZoneId) -> Result<SessionStats, EngineError> {
        let session = self.session(zone_id)?;
        let mut stats = session.stats.snapshot();
        stats.restarts = self
            .restarts
            .lock()
            .unwrap()
            .get(&zone_id)
            .copied()
            .unwrap_or(0);
        Ok(stats)
    }

    fn session(&self, zone_id: ZoneId) -> Result<Arc<ZoneSession>, EngineError> {
        self.sessions
            .lock()
            .unwrap()
            .get(&zone_id)
            .cloned()
            .ok_or(EngineError::NoSession(zone_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn options_for_file(zone: u32, path: &std::path::Path, prebuffer: usize) -> StartOptions {
        StartOptions {
            zone_id: ZoneId(zone),
            source: PlaybackSource::File {
                path: path.to_path_buf(),
            },
            profiles: vec![StreamProfile::Flac, StreamProfile::Pcm],
            preferred: PreferredOutput {
                prebuffer_bytes: prebuffer,
                ..Default::default()
            },
            label: "queue".to_string(),
            metadata: TrackMetadata::default(),
        }
    }

    fn temp_audio_file(bytes: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0xA5u8; bytes]).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_start_and_first_chunk() {
        let (engine, _events) = AudioEngine::new(EngineOptions::default());
        let file = temp_audio_file(64 * 1024);

        let session = engine
            .start(options_for_file(1, file.path(), 8 * 1024))
            .await
            .unwrap();
        assert_eq!(session.zone_id, ZoneId(1));
        assert_eq!(session.streams.len(), 2);

        engine
            .wait_for_first_chunk(ZoneId(1), StreamProfile::Flac, Some(2000))
            .await
            .unwrap();

        let stats = engine.session_stats(ZoneId(1)).unwrap();
        assert!(stats.total_bytes > 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_data() {
        let (engine, _events) = AudioEngine::new(EngineOptions::default());
        let file = temp_audio_file(32 * 1024);

        engine
            .start(options_for_file(2, file.path(), 1024))
            .await
            .unwrap();
        engine
            .wait_for_first_chunk(ZoneId(2), StreamProfile::Pcm, Some(2000))
            .await
            .unwrap();

        let mut stream = engine
            .create_stream(
                ZoneId(2),
                StreamProfile::Pcm,
                SubscriberOptions {
                    prime_with_buffer: true,
                    label: "test-output".to_string(),
                },
            )
            .unwrap();

        let chunk = stream.rx.recv().await.expect("primed chunk");
        assert_eq!(chunk.profile, StreamProfile::Pcm);
        assert!(!chunk.is_empty());
    }

    #[tokio::test]
    async fn test_handoff_failure_keeps_old_session() {
        let (engine, _events) = AudioEngine::new(EngineOptions::default());
        let file = temp_audio_file(32 * 1024);

        engine
            .start(options_for_file(3, file.path(), 1024))
            .await
            .unwrap();
        engine
            .wait_for_first_chunk(ZoneId(3), StreamProfile::Pcm, Some(2000))
            .await
            .unwrap();

        // A missing file can never produce a first chunk.
        let bad = StartOptions {
            source: PlaybackSource::File {
                path: "/nonexistent/definitely-missing.flac".into(),
            },
            ..options_for_file(3, file.path(), 1024)
        };
        let result = engine
            .start_with_handoff(bad, Some(HandoffOptions { timeout_ms: 500 }))
            .await;
        assert!(result.is_err());
        assert!(engine.has_session(ZoneId(3)));
    }

    #[tokio::test]
    async fn test_stop_removes_session() {
        let (engine, _events) = AudioEngine::new(EngineOptions::default());
        let file = temp_audio_file(4096);

        engine
            .start(options_for_file(4, file.path(), 0))
            .await
            .unwrap();
        assert!(engine.has_session(ZoneId(4)));
        engine.stop(ZoneId(4), Some("test"), true);
        assert!(!engine.has_session(ZoneId(4)));
    }

    #[tokio::test]
    async fn test_ended_event_emitted() {
        let (engine, mut events) = AudioEngine::new(EngineOptions::default());
        let file = temp_audio_file(2048);

        engine
            .start(options_for_file(5, file.path(), 0))
            .await
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
            .await
            .expect("event within deadline")
            .expect("channel open");
        match event {
            EngineEvent::Ended { zone_id, .. } => assert_eq!(zone_id, ZoneId(5)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
