//! SlimProto / Squeezelite output driver.
//!
//! Single-zone playback streams directly. Grouped playback starts paused
//! on every player; once all expected players signal "buffer ready" the
//! leader computes a target `jiffies` slightly ahead of its clock and
//! issues `unpauseAt(target)` to every member at once. When the ready
//! barrier times out, the players that did signal start best-effort.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use mraengine::{AudioEngine, SubscriberOptions, SubscriberStream};
use mragroups::{
    BarrierOutcome, GroupError, GroupParticipant, GroupTracker,
    coordinators::SlimprotoCoordinator,
};
use mramodel::{PlaybackSession, PreferredOutput, StreamProfile, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

/// Opaque SlimProto wire control.
#[async_trait]
pub trait SlimprotoControl: Send + Sync {
    /// Starts streaming to a player, paused when `paused` is set.
    async fn stream_to(
        &self,
        player: ZoneId,
        stream: SubscriberStream,
        paused: bool,
    ) -> Result<(), OutputError>;

    /// Unpauses a player at the given server clock target.
    async fn unpause_at(&self, player: ZoneId, jiffies_ms: u64) -> Result<(), OutputError>;

    async fn pause(&self, player: ZoneId) -> Result<(), OutputError>;

    async fn stop(&self, player: ZoneId) -> Result<(), OutputError>;

    async fn set_volume(&self, player: ZoneId, level: u32) -> Result<(), OutputError>;

    /// The server-side clock in milliseconds.
    fn jiffies_ms(&self) -> u64;
}

pub struct SlimprotoOutput {
    zone_id: ZoneId,
    control: Arc<dyn SlimprotoControl>,
    engine: Arc<AudioEngine>,
    tracker: Arc<GroupTracker>,
    coordinator: Arc<SlimprotoCoordinator>,
    streaming: Mutex<bool>,
}

impl SlimprotoOutput {
    pub fn new(
        zone_id: ZoneId,
        control: Arc<dyn SlimprotoControl>,
        engine: Arc<AudioEngine>,
        tracker: Arc<GroupTracker>,
        coordinator: Arc<SlimprotoCoordinator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            zone_id,
            control,
            engine,
            tracker,
            coordinator,
            streaming: Mutex::new(false),
        })
    }

    /// Called by the wire layer when this player reports "buffer ready".
    pub fn notify_buffer_ready(&self) {
        if let Some(record) = self.tracker.group_of(self.zone_id) {
            self.coordinator.player_ready(record.leader, self.zone_id);
        }
    }

    fn subscriber(&self, zone: ZoneId) -> Result<SubscriberStream, OutputError> {
        Ok(self.engine.create_stream(
            zone,
            StreamProfile::Pcm,
            SubscriberOptions {
                prime_with_buffer: false,
                label: format!("slimproto-{}", self.zone_id),
            },
        )?)
    }

    async fn grouped_play(&self, record: &mramodel::GroupRecord) -> Result<(), OutputError> {
        let all_zones = record.all_zones();
        self.coordinator
            .begin_group_start(record.leader, all_zones.iter().copied());

        // Every player starts paused, fed from the leader's pipeline.
        for player in &all_zones {
            let stream = self.subscriber(record.leader)?;
            self.control.stream_to(*player, stream, true).await?;
        }

        let (outcome, unpause_at) = self
            .coordinator
            .await_group_start(record.leader, self.control.jiffies_ms())
            .await;

        let targets: Vec<ZoneId> = match outcome {
            BarrierOutcome::AllReady => all_zones,
            BarrierOutcome::TimedOut(ready) => {
                warn!(
                    ready = ready.len(),
                    "ready barrier incomplete, starting signalled players"
                );
                ready
            }
        };

        for player in targets {
            self.control.unpause_at(player, unpause_at).await?;
        }
        info!(leader = %record.leader, jiffies = unpause_at, "group unpause issued");
        Ok(())
    }
}

#[async_trait]
impl ZoneOutput for SlimprotoOutput {
    fn type_name(&self) -> &str {
        "slimproto"
    }

    async fn play(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        let record = self.tracker.group_of(self.zone_id);

        match record {
            Some(record) if record.leader == self.zone_id && !record.members.is_empty() => {
                self.grouped_play(&record).await?;
            }
            Some(record) if record.leader != self.zone_id => {
                // Members are driven by the leader's grouped start.
                debug!(zone = %self.zone_id, leader = %record.leader, "grouped member, leader drives start");
            }
            _ => {
                let stream = self.subscriber(self.zone_id)?;
                self.control.stream_to(self.zone_id, stream, false).await?;
            }
        }
        *self.streaming.lock().unwrap() = true;
        Ok(())
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.control.pause(self.zone_id).await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        let target = SlimprotoCoordinator::compute_unpause_at(self.control.jiffies_ms());
        self.control.unpause_at(self.zone_id, target).await
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        *self.streaming.lock().unwrap() = false;
        self.control.stop(self.zone_id).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        self.control.set_volume(self.zone_id, level).await
    }

    fn preferred_output(&self) -> Option<PreferredOutput> {
        Some(PreferredOutput {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 128 * 1024,
        })
    }

    fn latency_ms(&self) -> u32 {
        200
    }
}

#[async_trait]
impl GroupParticipant for SlimprotoOutput {
    fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    fn has_running_session(&self) -> bool {
        *self.streaming.lock().unwrap()
    }

    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
        let stream = self.subscriber(leader).map_err(|e| GroupError::AttachFailed {
            zone: self.zone_id,
            message: e.to_string(),
        })?;
        self.control
            .stream_to(self.zone_id, stream, true)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;
        let target = SlimprotoCoordinator::compute_unpause_at(self.control.jiffies_ms());
        self.control
            .unpause_at(self.zone_id, target)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;
        Ok(true)
    }

    async fn detach(&self) -> Result<(), GroupError> {
        self.control
            .stop(self.zone_id)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }

    async fn stop_stream(&self) -> Result<(), GroupError> {
        *self.streaming.lock().unwrap() = false;
        self.control
            .stop(self.zone_id)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use mraengine::{EngineOptions, StartOptions};
    use mramodel::{GroupRecord, PlaybackSource, TrackMetadata};

    #[derive(Default)]
    struct RecordingControl {
        unpauses: Mutex<Vec<(ZoneId, u64)>>,
        streams: AtomicU64,
    }

    #[async_trait]
    impl SlimprotoControl for RecordingControl {
        async fn stream_to(
            &self,
            _player: ZoneId,
            _stream: SubscriberStream,
            _paused: bool,
        ) -> Result<(), OutputError> {
            self.streams.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unpause_at(&self, player: ZoneId, jiffies_ms: u64) -> Result<(), OutputError> {
            self.unpauses.lock().unwrap().push((player, jiffies_ms));
            Ok(())
        }

        async fn pause(&self, _player: ZoneId) -> Result<(), OutputError> {
            Ok(())
        }

        async fn stop(&self, _player: ZoneId) -> Result<(), OutputError> {
            Ok(())
        }

        async fn set_volume(&self, _player: ZoneId, _level: u32) -> Result<(), OutputError> {
            Ok(())
        }

        fn jiffies_ms(&self) -> u64 {
            50_000
        }
    }

    async fn engine_with_session(zone: u32) -> Arc<AudioEngine> {
        let (engine, _events) = AudioEngine::new(EngineOptions::default());
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 16 * 1024]).unwrap();
        engine
            .start(StartOptions {
                zone_id: ZoneId(zone),
                source: PlaybackSource::File {
                    path: file.path().to_path_buf(),
                },
                profiles: vec![StreamProfile::Pcm],
                preferred: PreferredOutput {
                    prebuffer_bytes: 0,
                    ..Default::default()
                },
                label: "queue".into(),
                metadata: TrackMetadata::default(),
            })
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_grouped_play_unpauses_all_at_target() {
        let engine = engine_with_session(1).await;
        let tracker = Arc::new(GroupTracker::new());
        let coordinator = Arc::new(SlimprotoCoordinator::with_ready_timeout(
            Duration::from_millis(100),
        ));
        let control = Arc::new(RecordingControl::default());

        let mut record = GroupRecord::new(ZoneId(1), "slimproto", "test");
        record.members.insert(ZoneId(2));
        tracker.upsert(record).unwrap();

        let leader = SlimprotoOutput::new(
            ZoneId(1),
            control.clone(),
            engine,
            tracker,
            coordinator.clone(),
        );

        // Players signal ready once the barrier is open.
        let signaller = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signaller.player_ready(ZoneId(1), ZoneId(1));
            signaller.player_ready(ZoneId(1), ZoneId(2));
        });

        let session = crate::drivers::test_sessions::playing(1);
        leader.play(&session).await.unwrap();

        let unpauses = control.unpauses.lock().unwrap();
        assert_eq!(unpauses.len(), 2);
        // 50_000 + 200 ms headroom.
        assert!(unpauses.iter().all(|(_, jiffies)| *jiffies == 50_200));
    }
}
