//! Best-effort start barrier for grouped players.
//!
//! SlimProto-style group starts wait for every expected player to signal
//! "buffer ready" before issuing a simultaneous unpause. The barrier has an
//! unconditional deadline: when it elapses, the players that did signal are
//! started best-effort.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use mramodel::ZoneId;

/// Result of waiting on the barrier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Every expected player signalled in time.
    AllReady,
    /// Deadline hit; contains the players that did signal.
    TimedOut(Vec<ZoneId>),
}

/// One group start: expected players, signalled players, a notify handle.
pub struct GroupStartBarrier {
    expected: HashSet<ZoneId>,
    ready: Mutex<HashSet<ZoneId>>,
    notify: Arc<Notify>,
}

impl GroupStartBarrier {
    pub fn new(expected: impl IntoIterator<Item = ZoneId>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            ready: Mutex::new(HashSet::new()),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Marks one player ready. Unknown players are ignored.
    pub fn signal_ready(&self, zone: ZoneId) {
        if !self.expected.contains(&zone) {
            return;
        }
        let all = {
            let mut ready = self.ready.lock().unwrap();
            ready.insert(zone);
            ready.len() == self.expected.len()
        };
        if all {
            self.notify.notify_waiters();
        }
    }

    fn all_ready(&self) -> bool {
        self.ready.lock().unwrap().len() == self.expected.len()
    }

    fn ready_list(&self) -> Vec<ZoneId> {
        let mut list: Vec<ZoneId> = self.ready.lock().unwrap().iter().copied().collect();
        list.sort();
        list
    }

    /// Waits for all expected players or the deadline, whichever first.
    pub async fn wait(&self, timeout: Duration) -> BarrierOutcome {
        if self.expected.is_empty() || self.all_ready() {
            return BarrierOutcome::AllReady;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.all_ready() {
                return BarrierOutcome::AllReady;
            }
            tokio::select! {
                _ = notified => {
                    if self.all_ready() {
                        return BarrierOutcome::AllReady;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let ready = self.ready_list();
                    warn!(
                        ready = ready.len(),
                        expected = self.expected.len(),
                        "group start barrier timed out, starting ready players"
                    );
                    return BarrierOutcome::TimedOut(ready);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_ready() {
        let barrier = Arc::new(GroupStartBarrier::new([ZoneId(1), ZoneId(2)]));

        let waiter = barrier.clone();
        let handle = tokio::spawn(async move { waiter.wait(Duration::from_secs(5)).await });

        barrier.signal_ready(ZoneId(1));
        barrier.signal_ready(ZoneId(2));

        assert_eq!(handle.await.unwrap(), BarrierOutcome::AllReady);
    }

    #[tokio::test]
    async fn test_timeout_returns_partial() {
        let barrier = GroupStartBarrier::new([ZoneId(1), ZoneId(2), ZoneId(3)]);
        barrier.signal_ready(ZoneId(2));
        barrier.signal_ready(ZoneId(9)); // unknown, ignored

        match barrier.wait(Duration::from_millis(50)).await {
            BarrierOutcome::TimedOut(ready) => assert_eq!(ready, vec![ZoneId(2)]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_barrier_immediate() {
        let barrier = GroupStartBarrier::new([]);
        assert_eq!(
            barrier.wait(Duration::from_millis(10)).await,
            BarrierOutcome::AllReady
        );
    }
}
