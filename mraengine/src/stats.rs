use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Runtime statistics of one zone session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub buffered_bytes: u64,
    pub total_bytes: u64,
    pub subscribers: usize,
    pub restarts: u32,
    pub subscriber_drops: u32,
    pub last_error: Option<String>,
}

/// Shared counters updated by the pipeline and subscriber slots.
#[derive(Debug, Default)]
pub(crate) struct StatsCell {
    pub buffered_bytes: AtomicU64,
    pub total_bytes: AtomicU64,
    pub subscribers: AtomicUsize,
    pub restarts: AtomicU64,
    pub subscriber_drops: AtomicU64,
    pub last_error: Mutex<Option<String>>,
}

impl StatsCell {
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            buffered_bytes: self.buffered_bytes.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed) as u32,
            subscriber_drops: self.subscriber_drops.load(Ordering::Relaxed) as u32,
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock().unwrap() = Some(message.into());
    }
}
