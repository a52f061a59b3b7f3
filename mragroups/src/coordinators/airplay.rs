//! AirPlay group coordination.
//!
//! AirPlay keeps one long-lived flow per leader with a sub-second rolling
//! backlog; a member joining mid-stream is primed from it so the join has
//! no audible gap. The leader's start timestamp gets an NTP lead
//! proportional to the number of group members, and it is not re-issued
//! once playback is more than half a second in.

use std::time::Duration;

use async_trait::async_trait;

use mramodel::{GroupChangeEvent, GroupRecord, ZoneId};

use crate::registry::ParticipantRegistry;

use super::{GroupSync, TransportCoordinator};

/// Base NTP lead granted to a solo zone.
const BASE_START_LEAD_MS: u64 = 250;
/// Additional lead per grouped member.
const PER_MEMBER_LEAD_MS: u64 = 150;
/// Elapsed playback beyond which the start timestamp is settled.
const START_SETTLED_AFTER: Duration = Duration::from_millis(500);

pub struct AirplayCoordinator {
    sync: GroupSync,
}

impl AirplayCoordinator {
    pub fn new() -> Self {
        Self {
            sync: GroupSync::new(ParticipantRegistry::new()),
        }
    }

    /// NTP lead for a start involving `member_count` grouped members.
    pub fn start_lead_ms(member_count: usize) -> u64 {
        BASE_START_LEAD_MS + PER_MEMBER_LEAD_MS * member_count as u64
    }

    /// Whether a start timestamp may still be re-issued.
    pub fn may_reissue_start(elapsed: Duration) -> bool {
        elapsed <= START_SETTLED_AFTER
    }

    /// Join at play time: attach `zone` to a running leader flow, returning
    /// `true` when local playback must be skipped.
    pub async fn try_join_leader(&self, record: &GroupRecord, zone: ZoneId) -> bool {
        self.sync.try_join_leader(record, zone).await
    }

    /// Attaches every grouped member after the leader started its flow.
    pub async fn sync_group_members(&self, leader: ZoneId, record: &GroupRecord) {
        self.sync.sync_group_members(leader, record).await;
    }

    /// Removes one member from the leader's flow.
    pub async fn detach_member(&self, zone: ZoneId) {
        self.sync.detach_member(zone).await;
    }
}

impl Default for AirplayCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportCoordinator for AirplayCoordinator {
    fn backend(&self) -> &'static str {
        "airplay"
    }

    fn registry(&self) -> &ParticipantRegistry {
        self.sync.registry()
    }

    async fn on_group_changed(&self, event: &GroupChangeEvent) {
        self.sync.handle(event).await;
    }
}
