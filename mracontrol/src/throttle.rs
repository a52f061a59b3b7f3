//! Debounce gates for chatty updates.
//!
//! Throttling timestamps live on the zone context and are only read and
//! written inside the zone's single-writer loop.

use std::time::{Duration, Instant};

/// Allows at most one event per interval.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Per-second gate used for metadata and position updates.
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Returns true and arms the gate when the interval has elapsed.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forces the next `allow` to pass (used when a hard state change must
    /// not be debounced away).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_blocks_within_interval() {
        let mut gate = RateGate::new(Duration::from_secs(60));
        assert!(gate.allow());
        assert!(!gate.allow());
        gate.reset();
        assert!(gate.allow());
    }
}
