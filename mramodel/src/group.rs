//! Multiroom group records shared across transport coordinators.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::zone::ZoneId;

/// One multiroom group.
///
/// Invariants (enforced by the group tracker):
/// - a zone belongs to at most one group,
/// - `members` never contains the leader,
/// - removing the leader dissolves the group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub leader: ZoneId,
    pub members: BTreeSet<ZoneId>,
    /// Transport family the group plays over ("airplay", "snapcast", ...).
    pub backend: String,
    /// Identifier assigned by an external grouping authority, if any.
    pub external_id: Option<String>,
    /// Who created the grouping ("user", "sonos", "musicassistant", ...).
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl GroupRecord {
    pub fn new(leader: ZoneId, backend: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            leader,
            members: BTreeSet::new(),
            backend: backend.into(),
            external_id: None,
            source: source.into(),
            updated_at: Utc::now(),
        }
    }

    /// All zones of the group, leader first.
    pub fn all_zones(&self) -> Vec<ZoneId> {
        let mut zones = vec![self.leader];
        zones.extend(self.members.iter().copied());
        zones
    }

    pub fn contains(&self, zone: ZoneId) -> bool {
        self.leader == zone || self.members.contains(&zone)
    }
}

/// Kind of group-tracker change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupChangeKind {
    New,
    Update,
    Remove,
}

/// Event published on the group-change feed.
///
/// Observers see either the before or the after record, never a partial
/// one: records are replaced copy-on-write.
#[derive(Clone, Debug)]
pub struct GroupChangeEvent {
    pub kind: GroupChangeKind,
    pub leader: ZoneId,
    pub record: GroupRecord,
}
