//! Leader election within a group.

use mramodel::{GroupRecord, ZoneId};

use crate::registry::ParticipantRegistry;

/// Picks the zone that should drive the group's flow.
///
/// Order of preference:
/// 1. the configured leader, when it has a running session and a
///    registered participant,
/// 2. the first member with both a running output session and a
///    registered participant,
/// 3. the first member with a participant registered (pending leader),
/// 4. none.
pub fn elect_leader(record: &GroupRecord, registry: &ParticipantRegistry) -> Option<ZoneId> {
    let has_session = |zone: ZoneId| {
        registry
            .get(zone)
            .map(|p| p.has_running_session())
            .unwrap_or(false)
    };

    if has_session(record.leader) {
        return Some(record.leader);
    }

    let zones = record.all_zones();
    if let Some(zone) = zones.iter().copied().find(|z| has_session(*z)) {
        return Some(zone);
    }

    zones.into_iter().find(|z| registry.contains(*z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use crate::error::GroupError;
    use crate::participant::GroupParticipant;

    struct FakeParticipant {
        zone: ZoneId,
        running: AtomicBool,
    }

    #[async_trait]
    impl GroupParticipant for FakeParticipant {
        fn zone_id(&self) -> ZoneId {
            self.zone
        }

        fn has_running_session(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn attach_to_leader(&self, _leader: ZoneId) -> Result<bool, GroupError> {
            Ok(true)
        }

        async fn detach(&self) -> Result<(), GroupError> {
            Ok(())
        }

        async fn stop_stream(&self) -> Result<(), GroupError> {
            Ok(())
        }
    }

    fn participant(zone: u32, running: bool) -> Arc<FakeParticipant> {
        Arc::new(FakeParticipant {
            zone: ZoneId(zone),
            running: AtomicBool::new(running),
        })
    }

    fn record(leader: u32, members: &[u32]) -> GroupRecord {
        let mut record = GroupRecord::new(ZoneId(leader), "airplay", "test");
        for member in members {
            record.members.insert(ZoneId(*member));
        }
        record
    }

    #[test]
    fn test_configured_leader_preferred() {
        let registry = ParticipantRegistry::new();
        registry.register(ZoneId(1), participant(1, true));
        registry.register(ZoneId(2), participant(2, true));

        assert_eq!(elect_leader(&record(1, &[2]), &registry), Some(ZoneId(1)));
    }

    #[test]
    fn test_falls_back_to_running_member() {
        let registry = ParticipantRegistry::new();
        registry.register(ZoneId(1), participant(1, false));
        registry.register(ZoneId(2), participant(2, true));

        assert_eq!(elect_leader(&record(1, &[2]), &registry), Some(ZoneId(2)));
    }

    #[test]
    fn test_pending_leader_without_sessions() {
        let registry = ParticipantRegistry::new();
        registry.register(ZoneId(2), participant(2, false));

        assert_eq!(elect_leader(&record(1, &[2, 3]), &registry), Some(ZoneId(2)));
    }

    #[test]
    fn test_no_participants() {
        let registry = ParticipantRegistry::new();
        assert_eq!(elect_leader(&record(1, &[2]), &registry), None);
    }
}
