use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing token source.
///
/// Used to invalidate in-flight background work: the caller records the
/// token it was issued, and results are discarded when a newer token has
/// been handed out since.
#[derive(Debug, Default)]
pub struct TokenCounter {
    next: AtomicU64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Issues a fresh token, superseding all previously issued ones.
    pub fn issue(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns true if `token` is the most recently issued token.
    pub fn is_current(&self, token: u64) -> bool {
        self.next.load(Ordering::SeqCst) == token + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_supersession() {
        let counter = TokenCounter::new();
        let first = counter.issue();
        assert!(counter.is_current(first));

        let second = counter.issue();
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }
}
