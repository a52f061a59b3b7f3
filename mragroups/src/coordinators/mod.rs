//! Per-transport group coordinators.
//!
//! Every coordinator owns a [`ParticipantRegistry`] and reacts to the group
//! tracker's change feed for its backend tag: on `update` it attaches newly
//! added members (replaying buffered audio where the transport supports it)
//! and detaches removed ones; on `remove` it dissolves the group by
//! stopping every driven stream.
//!
//! The shared attach/detach mechanics live in [`GroupSync`]; each transport
//! module adds its own start policy (stream plans, ready barriers, NTP
//! leads, frame replay, join/leave operations).

mod airplay;
mod sendspin;
mod slimproto;
mod snapcast;
mod sonos;

pub use airplay::AirplayCoordinator;
pub use sendspin::SendspinCoordinator;
pub use slimproto::SlimprotoCoordinator;
pub use snapcast::{GroupPlan, SnapcastCoordinator};
pub use sonos::{SonosCoordinator, SonosOp};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use mramodel::{GroupChangeEvent, GroupChangeKind, GroupRecord, ZoneId};

use crate::election::elect_leader;
use crate::participant::GroupParticipant;
use crate::registry::ParticipantRegistry;

/// Common surface of a transport coordinator.
#[async_trait]
pub trait TransportCoordinator: Send + Sync {
    /// Backend tag this coordinator serves ("airplay", "snapcast", ...).
    fn backend(&self) -> &'static str;

    fn registry(&self) -> &ParticipantRegistry;

    fn register(&self, zone_id: ZoneId, participant: Arc<dyn GroupParticipant>) {
        self.registry().register(zone_id, participant);
    }

    fn unregister(&self, zone_id: ZoneId) {
        self.registry().unregister(zone_id);
    }

    /// Reacts to one group-change event addressed to this backend.
    async fn on_group_changed(&self, event: &GroupChangeEvent);
}

/// Shared attach/detach mechanics over the participant registry.
///
/// Caches the previous membership per leader so updates can be applied
/// diff-style.
pub(crate) struct GroupSync {
    registry: ParticipantRegistry,
    last_members: Mutex<HashMap<ZoneId, BTreeSet<ZoneId>>>,
}

impl GroupSync {
    pub fn new(registry: ParticipantRegistry) -> Self {
        Self {
            registry,
            last_members: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    /// The leader driving this group, after election.
    pub fn effective_leader(&self, record: &GroupRecord) -> Option<ZoneId> {
        elect_leader(record, &self.registry)
    }

    fn diff(&self, leader: ZoneId, record: &GroupRecord) -> (Vec<ZoneId>, Vec<ZoneId>) {
        let current: BTreeSet<ZoneId> = record.members.iter().copied().collect();
        let mut cache = self.last_members.lock().unwrap();
        let previous = cache.insert(leader, current.clone()).unwrap_or_default();

        let added = current.difference(&previous).copied().collect();
        let removed = previous.difference(&current).copied().collect();
        (added, removed)
    }

    /// Applies a `new`/`update` event: attach added members, detach removed
    /// ones. Per-member failures are isolated (logged, dispatch continues).
    pub async fn apply_membership(&self, event: &GroupChangeEvent) {
        let Some(leader) = self.effective_leader(&event.record) else {
            debug!(leader = %event.leader, "no electable leader yet, deferring attach");
            return;
        };

        let (added, removed) = self.diff(event.leader, &event.record);

        for zone in removed {
            if let Some(participant) = self.registry.get(zone) {
                if let Err(e) = participant.detach().await {
                    warn!(zone = %zone, error = %e, "detach failed");
                }
            }
        }

        for zone in added {
            if zone == leader {
                continue;
            }
            if let Some(participant) = self.registry.get(zone) {
                match participant.attach_to_leader(leader).await {
                    Ok(true) => debug!(zone = %zone, leader = %leader, "member attached"),
                    Ok(false) => debug!(zone = %zone, "member attach deferred"),
                    Err(e) => warn!(zone = %zone, error = %e, "member attach failed"),
                }
            }
        }
    }

    /// Attaches every grouped member after the leader started.
    pub async fn sync_group_members(&self, leader: ZoneId, record: &GroupRecord) {
        for zone in record.members.iter().copied() {
            if let Some(participant) = self.registry.get(zone) {
                if let Err(e) = participant.attach_to_leader(leader).await {
                    warn!(zone = %zone, error = %e, "sync attach failed");
                }
            }
        }
    }

    /// Applies a `remove` event: stop every driven stream of the group.
    pub async fn dissolve(&self, event: &GroupChangeEvent) {
        self.last_members.lock().unwrap().remove(&event.leader);
        for zone in event.record.all_zones() {
            if let Some(participant) = self.registry.get(zone) {
                if let Err(e) = participant.stop_stream().await {
                    warn!(zone = %zone, error = %e, "stream stop failed during dissolve");
                }
            }
        }
    }

    /// Standard event handling shared by the coordinators.
    pub async fn handle(&self, event: &GroupChangeEvent) {
        match event.kind {
            GroupChangeKind::New | GroupChangeKind::Update => self.apply_membership(event).await,
            GroupChangeKind::Remove => self.dissolve(event).await,
        }
    }

    /// Participant-level join used at play time: when the zone is not the
    /// effective leader and a leader is running, attach and report that
    /// local playback must be skipped.
    pub async fn try_join_leader(&self, record: &GroupRecord, zone: ZoneId) -> bool {
        let Some(leader) = self.effective_leader(record) else {
            return false;
        };
        if leader == zone {
            return false;
        }
        let leader_running = self
            .registry
            .get(leader)
            .map(|p| p.has_running_session())
            .unwrap_or(false);
        if !leader_running {
            return false;
        }
        let Some(participant) = self.registry.get(zone) else {
            return false;
        };
        match participant.attach_to_leader(leader).await {
            Ok(joined) => joined,
            Err(e) => {
                warn!(zone = %zone, error = %e, "join-leader failed, falling back to local start");
                false
            }
        }
    }

    /// Detaches one participant (stop or regroup).
    pub async fn detach_member(&self, zone: ZoneId) {
        if let Some(participant) = self.registry.get(zone) {
            if let Err(e) = participant.detach().await {
                warn!(zone = %zone, error = %e, "detach failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use mramodel::ZoneId;

    use crate::error::GroupError;
    use crate::participant::GroupParticipant;

    /// Records the calls a coordinator makes against a participant.
    #[derive(Default)]
    pub struct CallLog {
        pub attached_to: Mutex<Vec<ZoneId>>,
        pub detached: Mutex<u32>,
        pub stopped: Mutex<u32>,
    }

    pub struct RecordingParticipant {
        pub zone: ZoneId,
        pub running: AtomicBool,
        pub log: Arc<CallLog>,
    }

    impl RecordingParticipant {
        pub fn new(zone: u32, running: bool) -> (Arc<Self>, Arc<CallLog>) {
            let log = Arc::new(CallLog::default());
            (
                Arc::new(Self {
                    zone: ZoneId(zone),
                    running: AtomicBool::new(running),
                    log: log.clone(),
                }),
                log,
            )
        }
    }

    #[async_trait]
    impl GroupParticipant for RecordingParticipant {
        fn zone_id(&self) -> ZoneId {
            self.zone
        }

        fn has_running_session(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
            self.log.attached_to.lock().unwrap().push(leader);
            Ok(true)
        }

        async fn detach(&self) -> Result<(), GroupError> {
            *self.log.detached.lock().unwrap() += 1;
            Ok(())
        }

        async fn stop_stream(&self) -> Result<(), GroupError> {
            *self.log.stopped.lock().unwrap() += 1;
            Ok(())
        }
    }
}
