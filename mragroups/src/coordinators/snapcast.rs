//! Snapcast group coordination.
//!
//! Snapcast multiroom maps one logical stream per group: the leader's
//! stream. All member client ids are pointed at it, and non-leader zones
//! receive `should_play = false` so they skip local playback entirely.

use async_trait::async_trait;

use mramodel::{GroupChangeEvent, ZoneId};

use crate::registry::ParticipantRegistry;

use super::{GroupSync, TransportCoordinator};

/// Playback plan for one zone of a Snapcast group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupPlan {
    pub should_play: bool,
    pub stream_id: String,
    pub client_ids: Vec<String>,
    pub leader_zone_id: ZoneId,
    pub is_leader: bool,
}

pub struct SnapcastCoordinator {
    sync: GroupSync,
}

impl SnapcastCoordinator {
    pub fn new() -> Self {
        Self {
            sync: GroupSync::new(ParticipantRegistry::new()),
        }
    }

    /// Builds the plan for `zone` given its own stream id and client ids.
    ///
    /// Ungrouped zones play their own stream. Grouped zones all reference
    /// the effective leader's stream; only the leader actually plays.
    pub fn build_plan(
        &self,
        zone: ZoneId,
        record: Option<&mramodel::GroupRecord>,
        base_stream_id: &str,
        base_client_ids: Vec<String>,
    ) -> GroupPlan {
        let Some(record) = record.filter(|r| r.contains(zone)) else {
            return GroupPlan {
                should_play: true,
                stream_id: base_stream_id.to_string(),
                client_ids: base_client_ids,
                leader_zone_id: zone,
                is_leader: true,
            };
        };

        let leader = self.sync.effective_leader(record).unwrap_or(record.leader);
        let is_leader = leader == zone;

        GroupPlan {
            should_play: is_leader,
            stream_id: if is_leader {
                base_stream_id.to_string()
            } else {
                format!("{}", leader)
            },
            client_ids: base_client_ids,
            leader_zone_id: leader,
            is_leader,
        }
    }
}

impl Default for SnapcastCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportCoordinator for SnapcastCoordinator {
    fn backend(&self) -> &'static str {
        "snapcast"
    }

    fn registry(&self) -> &ParticipantRegistry {
        self.sync.registry()
    }

    async fn on_group_changed(&self, event: &GroupChangeEvent) {
        self.sync.handle(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinators::test_support::RecordingParticipant;

    use mramodel::GroupRecord;

    fn record(leader: u32, members: &[u32]) -> GroupRecord {
        let mut record = GroupRecord::new(ZoneId(leader), "snapcast", "test");
        for member in members {
            record.members.insert(ZoneId(*member));
        }
        record
    }

    #[test]
    fn test_ungrouped_zone_plays_own_stream() {
        let coordinator = SnapcastCoordinator::new();
        let plan = coordinator.build_plan(
            ZoneId(1),
            None,
            "stream-1",
            vec!["client-a".to_string()],
        );
        assert!(plan.should_play);
        assert!(plan.is_leader);
        assert_eq!(plan.stream_id, "stream-1");
    }

    #[test]
    fn test_member_points_at_leader_stream() {
        let coordinator = SnapcastCoordinator::new();
        let (leader, _) = RecordingParticipant::new(1, true);
        let (member, _) = RecordingParticipant::new(2, false);
        coordinator.register(ZoneId(1), leader);
        coordinator.register(ZoneId(2), member);

        let record = record(1, &[2]);
        let plan = coordinator.build_plan(
            ZoneId(2),
            Some(&record),
            "stream-2",
            vec!["client-b".to_string()],
        );
        assert!(!plan.should_play);
        assert!(!plan.is_leader);
        assert_eq!(plan.leader_zone_id, ZoneId(1));
        assert_eq!(plan.stream_id, "zone-1");
    }

    #[test]
    fn test_leader_keeps_playing() {
        let coordinator = SnapcastCoordinator::new();
        let (leader, _) = RecordingParticipant::new(1, true);
        coordinator.register(ZoneId(1), leader);

        let record = record(1, &[2]);
        let plan = coordinator.build_plan(ZoneId(1), Some(&record), "stream-1", vec![]);
        assert!(plan.should_play);
        assert!(plan.is_leader);
        assert_eq!(plan.stream_id, "stream-1");
    }
}
