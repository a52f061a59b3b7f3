//! Mid-stream AirPlay group join: a member attaching to a playing leader
//! is primed from the leader's rolling backlog and never starts locally.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use mraengine::{AudioEngine, EngineOptions, StartOptions, SubscriberStream};
use mragroups::GroupTracker;
use mragroups::coordinators::{AirplayCoordinator, TransportCoordinator};
use mramodel::{
    GroupChangeEvent, GroupChangeKind, GroupRecord, PlaybackSource, PreferredOutput,
    StreamProfile, TrackMetadata, ZoneId,
};
use mraoutputs::{OutputError, ZoneOutput};
use mraoutputs::drivers::{AirplayOutput, AirplaySender};

#[derive(Default)]
struct CapturingSender {
    starts: AtomicU32,
    member_streams: Mutex<Vec<SubscriberStream>>,
}

#[async_trait]
impl AirplaySender for CapturingSender {
    async fn start_flow(
        &self,
        _zone: ZoneId,
        _stream: SubscriberStream,
        _start_ntp_lead_ms: u64,
    ) -> Result<(), OutputError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attach_member(
        &self,
        _leader: ZoneId,
        _member: ZoneId,
        primed: SubscriberStream,
    ) -> Result<(), OutputError> {
        self.member_streams.lock().unwrap().push(primed);
        Ok(())
    }

    async fn detach_member(&self, _member: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn flush(&self, _zone: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn set_volume(&self, _zone: ZoneId, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }

    async fn teardown(&self, _zone: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }
}

async fn playing_leader(engine: &Arc<AudioEngine>, zone: u32) -> tempfile::NamedTempFile {
    let mut media = tempfile::NamedTempFile::new().unwrap();
    media.write_all(&vec![0x11u8; 64 * 1024]).unwrap();
    media.flush().unwrap();

    engine
        .start(StartOptions {
            zone_id: ZoneId(zone),
            source: PlaybackSource::File {
                path: media.path().to_path_buf(),
            },
            profiles: vec![StreamProfile::Pcm],
            preferred: PreferredOutput {
                prebuffer_bytes: 0,
                ..Default::default()
            },
            label: "queue".to_string(),
            metadata: TrackMetadata::default(),
        })
        .await
        .unwrap();
    engine
        .wait_for_first_chunk(ZoneId(zone), StreamProfile::Pcm, Some(2000))
        .await
        .unwrap();
    media
}

#[tokio::test]
async fn member_join_is_primed_from_leader_backlog() {
    let (engine, _events) = AudioEngine::new(EngineOptions::default());
    let tracker = Arc::new(GroupTracker::new());
    let coordinator = Arc::new(AirplayCoordinator::new());
    let sender = Arc::new(CapturingSender::default());

    // Leader zone 1 is playing; an unrelated zone 3 plays on its own.
    let _leader_media = playing_leader(&engine, 1).await;
    let _other_media = playing_leader(&engine, 3).await;

    let leader_output = AirplayOutput::new(
        ZoneId(1),
        "HomePod",
        None,
        sender.clone(),
        engine.clone(),
        tracker.clone(),
        coordinator.clone(),
        1,
    );
    let member_output = AirplayOutput::new(
        ZoneId(2),
        "HomePod mini",
        None,
        sender.clone(),
        engine.clone(),
        tracker.clone(),
        coordinator.clone(),
        1,
    );
    coordinator.register(ZoneId(1), leader_output.clone());
    coordinator.register(ZoneId(2), member_output);

    // The leader's flow is running.
    let session = mraoutputs_session(1);
    leader_output.play(&session).await.unwrap();
    assert_eq!(sender.starts.load(Ordering::SeqCst), 1);

    // Zone 2 joins mid-stream.
    let mut record = GroupRecord::new(ZoneId(1), "airplay", "user");
    record.members.insert(ZoneId(2));
    tracker.upsert(record.clone()).unwrap();
    coordinator
        .on_group_changed(&GroupChangeEvent {
            kind: GroupChangeKind::Update,
            leader: ZoneId(1),
            record,
        })
        .await;

    // The member was attached, not locally started.
    assert_eq!(sender.starts.load(Ordering::SeqCst), 1);
    let mut streams = sender.member_streams.lock().unwrap();
    assert_eq!(streams.len(), 1);

    // The primed stream delivers backlog audio immediately.
    let primed = streams.first_mut().unwrap();
    let chunk = tokio::time::timeout(Duration::from_secs(1), primed.rx.recv())
        .await
        .expect("primed data within deadline")
        .expect("backlog chunk");
    assert_eq!(chunk.profile, StreamProfile::Pcm);
    assert!(!chunk.is_empty());
    drop(streams);

    // Unaffected zones keep their sessions.
    assert!(engine.has_session(ZoneId(3)));
    assert!(engine.has_session(ZoneId(1)));
}

fn mraoutputs_session(zone: u32) -> mramodel::PlaybackSession {
    use chrono::Utc;
    mramodel::PlaybackSession {
        zone_id: ZoneId(zone),
        source: "queue".to_string(),
        metadata: TrackMetadata::default(),
        streams: Vec::new(),
        pcm_stream: None,
        state: mramodel::SessionState::Playing,
        elapsed: 0,
        duration: 0,
        started_at: Utc::now(),
        updated_at: Utc::now(),
        playback_source: PlaybackSource::http("http://example.com/s.mp3"),
    }
}
