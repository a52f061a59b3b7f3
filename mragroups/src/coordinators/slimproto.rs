//! SlimProto / Squeezelite group coordination.
//!
//! Grouped SlimProto playback is started with a clock barrier: once every
//! expected player signals "buffer ready", the leader computes a target
//! `jiffies` a little ahead of its own clock and every member receives
//! `unpauseAt(target)` simultaneously. A ready timeout forces a best-effort
//! start with whoever signalled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mramodel::{GroupChangeEvent, ZoneId};

use crate::barrier::{BarrierOutcome, GroupStartBarrier};
use crate::registry::ParticipantRegistry;

use super::{GroupSync, TransportCoordinator};

/// Headroom added to the leader's clock for the synchronized unpause.
const UNPAUSE_HEADROOM_MS: u64 = 200;
/// Default barrier deadline.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SlimprotoCoordinator {
    sync: GroupSync,
    barriers: Mutex<HashMap<ZoneId, Arc<GroupStartBarrier>>>,
    ready_timeout: Duration,
}

impl SlimprotoCoordinator {
    pub fn new() -> Self {
        Self::with_ready_timeout(DEFAULT_READY_TIMEOUT)
    }

    pub fn with_ready_timeout(ready_timeout: Duration) -> Self {
        Self {
            sync: GroupSync::new(ParticipantRegistry::new()),
            barriers: Mutex::new(HashMap::new()),
            ready_timeout,
        }
    }

    /// Target jiffies for the synchronized unpause.
    pub fn compute_unpause_at(leader_jiffies_ms: u64) -> u64 {
        leader_jiffies_ms + UNPAUSE_HEADROOM_MS
    }

    /// Opens the start barrier for a group start led by `leader`.
    pub fn begin_group_start(
        &self,
        leader: ZoneId,
        expected: impl IntoIterator<Item = ZoneId>,
    ) -> Arc<GroupStartBarrier> {
        let barrier = Arc::new(GroupStartBarrier::new(expected));
        self.barriers.lock().unwrap().insert(leader, barrier.clone());
        barrier
    }

    /// A player reports its buffer is ready.
    pub fn player_ready(&self, leader: ZoneId, player: ZoneId) {
        if let Some(barrier) = self.barriers.lock().unwrap().get(&leader) {
            barrier.signal_ready(player);
        }
    }

    /// Waits for the barrier and returns its outcome together with the
    /// `unpauseAt` target derived from the leader's clock.
    pub async fn await_group_start(
        &self,
        leader: ZoneId,
        leader_jiffies_ms: u64,
    ) -> (BarrierOutcome, u64) {
        let barrier = self.barriers.lock().unwrap().get(&leader).cloned();
        let Some(barrier) = barrier else {
            return (
                BarrierOutcome::AllReady,
                Self::compute_unpause_at(leader_jiffies_ms),
            );
        };

        let outcome = barrier.wait(self.ready_timeout).await;
        self.barriers.lock().unwrap().remove(&leader);
        (outcome, Self::compute_unpause_at(leader_jiffies_ms))
    }
}

impl Default for SlimprotoCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportCoordinator for SlimprotoCoordinator {
    fn backend(&self) -> &'static str {
        "slimproto"
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

    #[test]
    fn test_unpause_headroom() {
        assert_eq!(SlimprotoCoordinator::compute_unpause_at(10_000), 10_200);
    }

    #[tokio::test]
    async fn test_group_start_all_ready() {
        let coordinator = SlimprotoCoordinator::new();
        let barrier =
            coordinator.begin_group_start(ZoneId(1), [ZoneId(1), ZoneId(2)]);

        coordinator.player_ready(ZoneId(1), ZoneId(1));
        coordinator.player_ready(ZoneId(1), ZoneId(2));
        assert_eq!(
            barrier.wait(Duration::from_secs(1)).await,
            BarrierOutcome::AllReady
        );
    }

    #[tokio::test]
    async fn test_group_start_timeout_starts_ready_players() {
        let coordinator = SlimprotoCoordinator::with_ready_timeout(Duration::from_millis(50));
        coordinator.begin_group_start(ZoneId(1), [ZoneId(1), ZoneId(2), ZoneId(3)]);
        coordinator.player_ready(ZoneId(1), ZoneId(1));
        coordinator.player_ready(ZoneId(1), ZoneId(3));

        let (outcome, unpause_at) = coordinator.await_group_start(ZoneId(1), 5_000).await;
        assert_eq!(outcome, BarrierOutcome::TimedOut(vec![ZoneId(1), ZoneId(3)]));
        assert_eq!(unpause_at, 5_200);
    }
}
