//! Zone-indexed participant registry shared by the coordinators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mramodel::ZoneId;

use crate::participant::GroupParticipant;

/// `zoneId → participant` indirection.
///
/// Breaking the driver/coordinator reference cycle: coordinators look
/// participants up here by id instead of holding drivers.
#[derive(Clone, Default)]
pub struct ParticipantRegistry {
    participants: Arc<Mutex<HashMap<ZoneId, Arc<dyn GroupParticipant>>>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, zone_id: ZoneId, participant: Arc<dyn GroupParticipant>) {
        self.participants.lock().unwrap().insert(zone_id, participant);
    }

    pub fn unregister(&self, zone_id: ZoneId) {
        self.participants.lock().unwrap().remove(&zone_id);
    }

    pub fn get(&self, zone_id: ZoneId) -> Option<Arc<dyn GroupParticipant>> {
        self.participants.lock().unwrap().get(&zone_id).cloned()
    }

    pub fn contains(&self, zone_id: ZoneId) -> bool {
        self.participants.lock().unwrap().contains_key(&zone_id)
    }
}
