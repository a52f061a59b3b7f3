//! Sonos group coordination.
//!
//! Sonos groups are reshaped with JOIN/LEAVE operations against the
//! renderer's own grouping service. Prior membership is cached per leader
//! so each observed change yields a minimal diff of operations.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use mramodel::{GroupChangeEvent, GroupChangeKind, ZoneId};

use crate::registry::ParticipantRegistry;

use super::{GroupSync, TransportCoordinator};

/// One grouping operation to issue against the Sonos topology.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SonosOp {
    /// Zone joins the group coordinated by `leader`.
    Join { zone: ZoneId, leader: ZoneId },
    /// Zone leaves its group and becomes standalone.
    Leave { zone: ZoneId },
}

pub struct SonosCoordinator {
    sync: GroupSync,
    prior_members: Mutex<HashMap<ZoneId, BTreeSet<ZoneId>>>,
}

impl SonosCoordinator {
    pub fn new() -> Self {
        Self {
            sync: GroupSync::new(ParticipantRegistry::new()),
            prior_members: Mutex::new(HashMap::new()),
        }
    }

    /// Derives the JOIN/LEAVE operations for one observed change.
    pub fn plan_ops(&self, event: &GroupChangeEvent) -> Vec<SonosOp> {
        let mut cache = self.prior_members.lock().unwrap();

        match event.kind {
            GroupChangeKind::Remove => {
                let previous = cache.remove(&event.leader).unwrap_or_default();
                previous
                    .into_iter()
                    .map(|zone| SonosOp::Leave { zone })
                    .collect()
            }
            GroupChangeKind::New | GroupChangeKind::Update => {
                let current: BTreeSet<ZoneId> = event.record.members.iter().copied().collect();
                let previous = cache.insert(event.leader, current.clone()).unwrap_or_default();

                let mut ops: Vec<SonosOp> = current
                    .difference(&previous)
                    .map(|zone| SonosOp::Join {
                        zone: *zone,
                        leader: event.leader,
                    })
                    .collect();
                ops.extend(
                    previous
                        .difference(&current)
                        .map(|zone| SonosOp::Leave { zone: *zone }),
                );
                ops
            }
        }
    }
}

impl Default for SonosCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportCoordinator for SonosCoordinator {
    fn backend(&self) -> &'static str {
        "sonos"
    }

    fn registry(&self) -> &ParticipantRegistry {
        self.sync.registry()
    }

    async fn on_group_changed(&self, event: &GroupChangeEvent) {
        // Diff-derived operations are executed by the participants; the
        // shared sync handles attach/detach bookkeeping.
        self.sync.handle(event).await;
    }
}
