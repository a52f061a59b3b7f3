//! The process-wide group tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info};

use mramodel::{GroupChangeEvent, GroupChangeKind, GroupRecord, ZoneId};

use crate::error::GroupError;

/// Indexed store of group records with a change-event bus.
///
/// Records are immutable snapshots behind `Arc`; every mutation installs a
/// fresh record, so readers racing an update observe a consistent before or
/// after image.
pub struct GroupTracker {
    groups: Mutex<HashMap<ZoneId, Arc<GroupRecord>>>,
    member_index: Mutex<HashMap<ZoneId, ZoneId>>,
    subscribers: Mutex<Vec<Sender<GroupChangeEvent>>>,
}

impl Default for GroupTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTracker {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            member_index: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes to the change feed.
    pub fn subscribe(&self) -> Receiver<GroupChangeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn broadcast(&self, event: GroupChangeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Installs or updates a group record.
    ///
    /// Fails when any zone of the record already belongs to a different
    /// group (a zone is in at most one group).
    pub fn upsert(&self, mut record: GroupRecord) -> Result<(), GroupError> {
        record.members.remove(&record.leader);
        record.updated_at = Utc::now();
        let leader = record.leader;

        let kind = {
            let mut groups = self.groups.lock().unwrap();
            let mut member_index = self.member_index.lock().unwrap();

            for zone in record.all_zones() {
                if let Some(other_leader) = member_index.get(&zone) {
                    if *other_leader != leader {
                        return Err(GroupError::AlreadyGrouped(zone, *other_leader));
                    }
                }
                if zone != leader && groups.contains_key(&zone) {
                    return Err(GroupError::AlreadyGrouped(zone, zone));
                }
            }

            let kind = if groups.contains_key(&leader) {
                GroupChangeKind::Update
            } else {
                GroupChangeKind::New
            };

            // Drop index entries of zones that left the group.
            member_index.retain(|zone, l| *l != leader || record.contains(*zone));
            for zone in record.all_zones() {
                member_index.insert(zone, leader);
            }
            groups.insert(leader, Arc::new(record.clone()));
            kind
        };

        info!(leader = %leader, members = record.members.len(), ?kind, "group record installed");
        self.broadcast(GroupChangeEvent {
            kind,
            leader,
            record,
        });
        Ok(())
    }

    /// Removes the group led by `leader`, dissolving it.
    pub fn remove(&self, leader: ZoneId) -> Result<(), GroupError> {
        let record = {
            let mut groups = self.groups.lock().unwrap();
            let record = groups.remove(&leader).ok_or(GroupError::NoSuchGroup(leader))?;
            self.member_index
                .lock()
                .unwrap()
                .retain(|_, l| *l != leader);
            record
        };

        info!(leader = %leader, "group dissolved");
        self.broadcast(GroupChangeEvent {
            kind: GroupChangeKind::Remove,
            leader,
            record: (*record).clone(),
        });
        Ok(())
    }

    /// Detaches one zone.
    ///
    /// Removing the leader dissolves the whole group; removing a member
    /// publishes an update.
    pub fn remove_zone(&self, zone: ZoneId) -> Result<(), GroupError> {
        let leader = self
            .member_index
            .lock()
            .unwrap()
            .get(&zone)
            .copied()
            .ok_or(GroupError::NoSuchGroup(zone))?;

        if leader == zone {
            return self.remove(zone);
        }

        let updated = {
            let groups = self.groups.lock().unwrap();
            let record = groups.get(&leader).ok_or(GroupError::NoSuchGroup(leader))?;
            let mut updated = (**record).clone();
            updated.members.remove(&zone);
            updated
        };
        debug!(zone = %zone, leader = %leader, "zone leaves group");
        self.upsert(updated)
    }

    /// The record of the group `zone` belongs to, if any.
    pub fn group_of(&self, zone: ZoneId) -> Option<Arc<GroupRecord>> {
        let leader = *self.member_index.lock().unwrap().get(&zone)?;
        self.groups.lock().unwrap().get(&leader).cloned()
    }

    /// The record led by `leader`, if any.
    pub fn record(&self, leader: ZoneId) -> Option<Arc<GroupRecord>> {
        self.groups.lock().unwrap().get(&leader).cloned()
    }

    pub fn list(&self) -> Vec<Arc<GroupRecord>> {
        self.groups.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(leader: u32, members: &[u32]) -> GroupRecord {
        let mut record = GroupRecord::new(ZoneId(leader), "snapcast", "test");
        for member in members {
            record.members.insert(ZoneId(*member));
        }
        record
    }

    #[test]
    fn test_upsert_and_events() {
        let tracker = GroupTracker::new();
        let rx = tracker.subscribe();

        tracker.upsert(record(1, &[2, 3])).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, GroupChangeKind::New);
        assert_eq!(event.leader, ZoneId(1));

        tracker.upsert(record(1, &[2])).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, GroupChangeKind::Update);
        assert_eq!(event.record.members.len(), 1);
    }

    #[test]
    fn test_zone_in_one_group_only() {
        let tracker = GroupTracker::new();
        tracker.upsert(record(1, &[2])).unwrap();
        assert!(tracker.upsert(record(4, &[2])).is_err());
        // Leaders are zones too.
        assert!(tracker.upsert(record(5, &[1])).is_err());
    }

    #[test]
    fn test_remove_leader_dissolves() {
        let tracker = GroupTracker::new();
        let rx = tracker.subscribe();
        tracker.upsert(record(1, &[2])).unwrap();
        let _ = rx.try_recv();

        tracker.remove_zone(ZoneId(1)).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, GroupChangeKind::Remove);
        assert!(tracker.group_of(ZoneId(2)).is_none());
        assert!(tracker.record(ZoneId(1)).is_none());
    }

    #[test]
    fn test_remove_member_updates() {
        let tracker = GroupTracker::new();
        tracker.upsert(record(1, &[2, 3])).unwrap();
        tracker.remove_zone(ZoneId(3)).unwrap();

        let group = tracker.record(ZoneId(1)).unwrap();
        assert!(!group.contains(ZoneId(3)));
        assert!(group.contains(ZoneId(2)));
        // The departed zone can join elsewhere now.
        tracker.upsert(record(4, &[3])).unwrap();
    }

    #[test]
    fn test_leader_never_in_members() {
        let tracker = GroupTracker::new();
        let mut rec = record(1, &[2]);
        rec.members.insert(ZoneId(1));
        tracker.upsert(rec).unwrap();
        let stored = tracker.record(ZoneId(1)).unwrap();
        assert!(!stored.members.contains(&ZoneId(1)));
    }
}
