//! Sendspin (PCM multicast) group coordination.
//!
//! The leader emits PCM frames stamped with server time; members mirror
//! the same client-id stream. On membership change, buffered future frames
//! are replayed to late joiners so their audio aligns with the group.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mramodel::{GroupChangeEvent, ZoneId};

use crate::frames::{FrameBuffer, TimedFrame};
use crate::registry::ParticipantRegistry;

use super::{GroupSync, TransportCoordinator};

/// Frames are kept at least this far ahead of the playback clock.
pub const MIN_LEAD_WINDOW_MS: u64 = 150;
const MAX_BUFFERED_FRAMES: usize = 512;

pub struct SendspinCoordinator {
    sync: GroupSync,
    buffers: Mutex<HashMap<ZoneId, Arc<FrameBuffer>>>,
    lead_window_ms: u64,
}

impl SendspinCoordinator {
    pub fn new(lead_window_ms: u64) -> Self {
        Self {
            sync: GroupSync::new(ParticipantRegistry::new()),
            buffers: Mutex::new(HashMap::new()),
            lead_window_ms: lead_window_ms.max(MIN_LEAD_WINDOW_MS),
        }
    }

    /// The frame buffer of the leader's flow, created on first use.
    pub fn buffer_for(&self, leader: ZoneId) -> Arc<FrameBuffer> {
        self.buffers
            .lock()
            .unwrap()
            .entry(leader)
            .or_insert_with(|| {
                Arc::new(FrameBuffer::new(self.lead_window_ms, MAX_BUFFERED_FRAMES))
            })
            .clone()
    }

    /// Buffers one outbound frame of the leader's stream.
    pub fn record_frame(&self, leader: ZoneId, frame: TimedFrame, now_ms: u64) {
        self.buffer_for(leader).push(frame, now_ms);
    }

    /// Frames a late joiner must receive to align with the group.
    pub fn replay_for_join(&self, leader: ZoneId, now_ms: u64) -> Vec<TimedFrame> {
        self.buffers
            .lock()
            .unwrap()
            .get(&leader)
            .map(|buffer| buffer.replay_for_join(now_ms))
            .unwrap_or_default()
    }

    fn drop_buffer(&self, leader: ZoneId) {
        self.buffers.lock().unwrap().remove(&leader);
    }
}

#[async_trait]
impl TransportCoordinator for SendspinCoordinator {
    fn backend(&self) -> &'static str {
        "sendspin"
    }

    fn registry(&self) -> &ParticipantRegistry {
        self.sync.registry()
    }

    async fn on_group_changed(&self, event: &GroupChangeEvent) {
        self.sync.handle(event).await;
        if matches!(event.kind, mramodel::GroupChangeKind::Remove) {
            self.drop_buffer(event.leader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(at: u64) -> TimedFrame {
        TimedFrame {
            play_at_ms: at,
            payload: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_lead_window_floor() {
        let coordinator = SendspinCoordinator::new(50);
        assert_eq!(coordinator.lead_window_ms, MIN_LEAD_WINDOW_MS);
    }

    #[test]
    fn test_replay_returns_future_frames() {
        let coordinator = SendspinCoordinator::new(200);
        coordinator.record_frame(ZoneId(1), frame(1000), 1000);
        coordinator.record_frame(ZoneId(1), frame(1050), 1000);
        coordinator.record_frame(ZoneId(1), frame(1100), 1000);

        let replayed = coordinator.replay_for_join(ZoneId(1), 1050);
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn test_unknown_leader_replays_nothing() {
        let coordinator = SendspinCoordinator::new(200);
        assert!(coordinator.replay_for_join(ZoneId(9), 0).is_empty());
    }

    #[tokio::test]
    async fn test_remove_drops_buffer() {
        let coordinator = SendspinCoordinator::new(200);
        coordinator.record_frame(ZoneId(1), frame(1000), 1000);

        let record = mramodel::GroupRecord::new(ZoneId(1), "sendspin", "test");
        coordinator
            .on_group_changed(&GroupChangeEvent {
                kind: mramodel::GroupChangeKind::Remove,
                leader: ZoneId(1),
                record,
            })
            .await;
        assert!(coordinator.replay_for_join(ZoneId(1), 0).is_empty());
    }
}
