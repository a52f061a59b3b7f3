//! The per-zone queue structure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::debug;

use mramodel::{QueueAuthority, QueueItem, RepeatMode, normalize_audiopath};

use crate::error::QueueError;

/// Outcome of stepping the queue after end-of-track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Continue with the item now at `current_index`.
    Next(usize),
    /// The queue is exhausted.
    End,
    /// The current item disappeared from under us.
    InvalidNext,
}

/// Outcome of applying an output-side queue snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    /// Snapshot identical to the last applied one.
    Duplicate,
    /// Empty snapshots are never applied.
    IgnoredEmpty,
    /// Single-item snapshot merged in place at `current_index`.
    Merged,
}

/// Windowed read view of a queue, for the notifier and the admin surface.
#[derive(Clone, Debug, Serialize)]
pub struct QueueView {
    pub items: Vec<QueueItem>,
    pub total: usize,
    pub current_index: usize,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub authority: QueueAuthority,
}

/// Ordered items of one zone plus progression flags.
///
/// Invariants:
/// - `current_index` stays in `[0, items.len())`, or `0` when empty,
/// - `unique_id` is unique within the queue,
/// - `original_index` is preserved across shuffle so the original order
///   is always recoverable.
#[derive(Clone, Debug, Default)]
pub struct ZoneQueue {
    items: Vec<QueueItem>,
    shuffle: bool,
    repeat: RepeatMode,
    current_index: usize,
    authority: QueueAuthority,
    /// Token of the background fill allowed to append; superseded tokens
    /// are rejected.
    fill_token: u64,
    /// Signature of the last applied output snapshot.
    last_snapshot_sig: Option<u64>,
}

impl ZoneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== accessors =====

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&QueueItem> {
        self.items.get(self.current_index)
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn authority(&self) -> &QueueAuthority {
        &self.authority
    }

    pub fn fill_token(&self) -> u64 {
        self.fill_token
    }

    /// Windowed view starting at `start`, at most `limit` items
    /// (`limit = 0` means everything).
    pub fn view(&self, start: usize, limit: usize) -> QueueView {
        let end = if limit == 0 {
            self.items.len()
        } else {
            (start + limit).min(self.items.len())
        };
        let items = if start >= self.items.len() {
            Vec::new()
        } else {
            self.items[start..end].to_vec()
        };
        QueueView {
            items,
            total: self.items.len(),
            current_index: self.current_index,
            shuffle: self.shuffle,
            repeat: self.repeat,
            authority: self.authority.clone(),
        }
    }

    // ===== construction =====

    /// Replaces the queue contents.
    ///
    /// Every item receives a fresh `qindex`; `original_index` is preserved
    /// when the caller already assigned one (mid-stream backfill), generated
    /// from the position otherwise. `current_index` is clamped.
    pub fn set_items(
        &mut self,
        mut items: Vec<QueueItem>,
        current_index: usize,
        authority: QueueAuthority,
    ) {
        let preserve_original = items
            .iter()
            .enumerate()
            .any(|(pos, item)| item.original_index != 0 && item.original_index != pos);

        for (pos, item) in items.iter_mut().enumerate() {
            item.qindex = pos;
            if !preserve_original {
                item.original_index = pos;
            }
        }

        self.items = items;
        self.current_index = Self::clamp_index(current_index, self.items.len());
        self.authority = authority;
        self.last_snapshot_sig = None;
    }

    /// Appends backfill results, keeping `qindex`/`original_index` dense.
    ///
    /// The caller passes the token it was issued when the fill started; a
    /// token superseded by a rebuild rejects the append.
    pub fn append_fill(&mut self, token: u64, items: Vec<QueueItem>) -> Result<usize, QueueError> {
        if token != self.fill_token {
            return Err(QueueError::StaleFillToken {
                token,
                current: self.fill_token,
            });
        }

        let base = self.items.len();
        let mut appended = 0;
        for (offset, mut item) in items.into_iter().enumerate() {
            if self.items.iter().any(|existing| existing.unique_id == item.unique_id) {
                continue;
            }
            item.qindex = base + appended;
            item.original_index = base + offset;
            self.items.push(item);
            appended += 1;
        }
        debug!(appended, total = self.items.len(), "queue backfill applied");
        Ok(appended)
    }

    /// Issues a new fill token, invalidating any fill still in flight.
    pub fn next_fill_token(&mut self) -> u64 {
        self.fill_token += 1;
        self.fill_token
    }

    // ===== navigation =====

    /// Finds an item by normalized audiopath or unique id.
    pub fn position_of(&self, target: &str) -> Option<usize> {
        let normalized = normalize_audiopath(target);
        self.items.iter().position(|item| {
            item.unique_id == target || normalize_audiopath(&item.audiopath) == normalized
        })
    }

    /// Jumps to an absolute index.
    pub fn seek_to(&mut self, index: usize) -> Result<&QueueItem, QueueError> {
        if index >= self.items.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.current_index = index;
        Ok(&self.items[index])
    }

    /// Computes the index after natural end-of-track, honoring repeat.
    ///
    /// `repeat = one` replays the current item; `repeat = all` wraps at the
    /// end. Explicit steps use [`ZoneQueue::step`] which overrides
    /// repeat-one for the duration of the step.
    pub fn advance_after_end(&mut self) -> AdvanceOutcome {
        if self.items.is_empty() {
            return AdvanceOutcome::InvalidNext;
        }
        if self.current_index >= self.items.len() {
            // The current item disappeared (concurrent rebuild shrank us).
            self.current_index = 0;
            return AdvanceOutcome::InvalidNext;
        }

        match self.repeat {
            RepeatMode::One => AdvanceOutcome::Next(self.current_index),
            RepeatMode::All => {
                self.current_index = (self.current_index + 1) % self.items.len();
                AdvanceOutcome::Next(self.current_index)
            }
            RepeatMode::Off => {
                if self.current_index + 1 < self.items.len() {
                    self.current_index += 1;
                    AdvanceOutcome::Next(self.current_index)
                } else {
                    AdvanceOutcome::End
                }
            }
        }
    }

    /// Explicit queue step (queueplus / queueminus).
    ///
    /// Steps past repeat-one; `repeat = all` wraps in both directions.
    pub fn step(&mut self, delta: i64) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        let len = self.items.len() as i64;
        let target = self.current_index as i64 + delta;

        let next = match self.repeat {
            RepeatMode::All => target.rem_euclid(len),
            _ => {
                if target < 0 || target >= len {
                    return None;
                }
                target
            }
        };

        self.current_index = next as usize;
        Some(self.current_index)
    }

    // ===== shuffle / repeat =====

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.next();
        self.repeat
    }

    /// Enables or disables shuffle.
    ///
    /// Enabling shuffles the tail (items strictly after `current_index`)
    /// with Fisher-Yates, keeping the already-played head and the current
    /// item in place. Disabling restores the original order by stable sort
    /// on `original_index`, keeping the current item current.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled == self.shuffle {
            return;
        }
        self.shuffle = enabled;

        if self.items.len() < 2 {
            self.reassign_qindex();
            return;
        }

        if enabled {
            let tail_start = (self.current_index + 1).min(self.items.len());
            self.items[tail_start..].shuffle(&mut rand::rng());
        } else {
            let current_uid = self.current_item().map(|item| item.unique_id.clone());
            self.items.sort_by_key(|item| item.original_index);
            if let Some(uid) = current_uid {
                if let Some(pos) = self.items.iter().position(|item| item.unique_id == uid) {
                    self.current_index = pos;
                }
            }
        }

        self.reassign_qindex();
    }

    /// Re-shuffles the upcoming tail in place (used when a rebuilt queue
    /// carries a pending shuffle flag).
    pub fn reshuffle_upcoming(&mut self) {
        if self.items.len() < 2 {
            return;
        }
        let tail_start = (self.current_index + 1).min(self.items.len());
        self.items[tail_start..].shuffle(&mut rand::rng());
        self.reassign_qindex();
    }

    fn reassign_qindex(&mut self) {
        for (pos, item) in self.items.iter_mut().enumerate() {
            item.qindex = pos;
        }
    }

    // ===== output snapshots (remote authority) =====

    /// Applies a queue snapshot observed from an output / remote provider.
    ///
    /// - empty snapshots are ignored entirely,
    /// - a single-item snapshot is merged into the existing queue at
    ///   `current_index` instead of wiping it,
    /// - a snapshot whose `(len, audiopath list, current_index)` signature
    ///   equals the previous one is skipped.
    pub fn update_from_output(
        &mut self,
        items: Vec<QueueItem>,
        current_index: usize,
    ) -> SnapshotOutcome {
        if items.is_empty() {
            return SnapshotOutcome::IgnoredEmpty;
        }

        let sig = Self::snapshot_signature(&items, current_index);
        if self.last_snapshot_sig == Some(sig) {
            return SnapshotOutcome::Duplicate;
        }

        if items.len() == 1 && self.items.len() > 1 {
            let mut item = items.into_iter().next().unwrap();
            self.last_snapshot_sig = Some(sig);
            let index = Self::clamp_index(self.current_index, self.items.len());
            item.qindex = index;
            item.original_index = self.items[index].original_index;
            self.items[index] = item;
            return SnapshotOutcome::Merged;
        }

        let authority = self.authority.clone();
        self.set_items(items, current_index, authority);
        self.last_snapshot_sig = Some(sig);
        SnapshotOutcome::Applied
    }

    fn snapshot_signature(items: &[QueueItem], current_index: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        items.len().hash(&mut hasher);
        for item in items {
            item.audiopath.hash(&mut hasher);
        }
        current_index.hash(&mut hasher);
        hasher.finish()
    }

    fn clamp_index(index: usize, len: usize) -> usize {
        if len == 0 { 0 } else { index.min(len - 1) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> QueueItem {
        QueueItem::from_audiopath(format!("library:track:{id}"))
    }

    fn queue_of(n: usize) -> ZoneQueue {
        let mut queue = ZoneQueue::new();
        let items: Vec<QueueItem> = (0..n).map(|i| item(&i.to_string())).collect();
        queue.set_items(items, 0, QueueAuthority::Local);
        queue
    }

    #[test]
    fn test_set_items_assigns_indices() {
        let queue = queue_of(3);
        for (pos, item) in queue.items().iter().enumerate() {
            assert_eq!(item.qindex, pos);
            assert_eq!(item.original_index, pos);
        }
    }

    #[test]
    fn test_current_index_clamped() {
        let mut queue = ZoneQueue::new();
        queue.set_items(vec![item("a"), item("b")], 99, QueueAuthority::Local);
        assert_eq!(queue.current_index(), 1);

        queue.set_items(Vec::new(), 5, QueueAuthority::Local);
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn test_advance_repeat_off() {
        let mut queue = queue_of(2);
        assert_eq!(queue.advance_after_end(), AdvanceOutcome::Next(1));
        assert_eq!(queue.advance_after_end(), AdvanceOutcome::End);
    }

    #[test]
    fn test_advance_repeat_all_wraps() {
        let mut queue = queue_of(2);
        queue.set_repeat(RepeatMode::All);
        assert_eq!(queue.advance_after_end(), AdvanceOutcome::Next(1));
        assert_eq!(queue.advance_after_end(), AdvanceOutcome::Next(0));
    }

    #[test]
    fn test_advance_repeat_one_replays() {
        let mut queue = queue_of(2);
        queue.set_repeat(RepeatMode::One);
        assert_eq!(queue.advance_after_end(), AdvanceOutcome::Next(0));
    }

    #[test]
    fn test_step_overrides_repeat_one() {
        let mut queue = queue_of(3);
        queue.set_repeat(RepeatMode::One);
        assert_eq!(queue.step(1), Some(1));
        assert_eq!(queue.step(-1), Some(0));
        assert_eq!(queue.step(-1), None);
    }

    #[test]
    fn test_shuffle_then_unshuffle_restores_order() {
        let mut queue = queue_of(20);
        queue.seek_to(3).unwrap();
        let before: Vec<String> = queue.items().iter().map(|i| i.unique_id.clone()).collect();
        let current = queue.current_item().unwrap().unique_id.clone();

        queue.set_shuffle(true);
        // Head (0..=3) untouched.
        let head: Vec<String> = queue.items()[..4].iter().map(|i| i.unique_id.clone()).collect();
        assert_eq!(head, before[..4].to_vec());
        assert_eq!(queue.current_item().unwrap().unique_id, current);

        queue.set_shuffle(false);
        let restored: Vec<String> = queue.items().iter().map(|i| i.unique_id.clone()).collect();
        assert_eq!(restored, before);
        assert_eq!(queue.current_item().unwrap().unique_id, current);
        for (pos, item) in queue.items().iter().enumerate() {
            assert_eq!(item.qindex, pos);
        }
    }

    #[test]
    fn test_shuffle_preserves_item_set() {
        let mut queue = queue_of(10);
        let mut before: Vec<String> = queue.items().iter().map(|i| i.unique_id.clone()).collect();
        queue.set_shuffle(true);
        let mut after: Vec<String> = queue.items().iter().map(|i| i.unique_id.clone()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_snapshot_empty_ignored() {
        let mut queue = queue_of(3);
        assert_eq!(
            queue.update_from_output(Vec::new(), 0),
            SnapshotOutcome::IgnoredEmpty
        );
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_snapshot_single_item_merges() {
        let mut queue = queue_of(3);
        queue.seek_to(1).unwrap();
        let replacement = item("replacement");
        assert_eq!(
            queue.update_from_output(vec![replacement.clone()], 0),
            SnapshotOutcome::Merged
        );
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.items()[1].audiopath, replacement.audiopath);
    }

    #[test]
    fn test_snapshot_duplicate_skipped() {
        let mut queue = queue_of(1);
        let items = vec![item("x"), item("y")];
        assert_eq!(
            queue.update_from_output(items.clone(), 1),
            SnapshotOutcome::Applied
        );
        assert_eq!(
            queue.update_from_output(items, 1),
            SnapshotOutcome::Duplicate
        );
    }

    #[test]
    fn test_fill_token_supersession() {
        let mut queue = queue_of(2);
        let token = queue.next_fill_token();
        assert_eq!(queue.append_fill(token, vec![item("c")]).unwrap(), 1);
        assert_eq!(queue.len(), 3);

        let stale = token;
        let _newer = queue.next_fill_token();
        assert!(queue.append_fill(stale, vec![item("d")]).is_err());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_fill_skips_duplicate_ids() {
        let mut queue = queue_of(2);
        let token = queue.next_fill_token();
        let appended = queue
            .append_fill(token, vec![item("0"), item("new")])
            .unwrap();
        assert_eq!(appended, 1);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_position_of_matches_normalized() {
        let mut queue = ZoneQueue::new();
        queue.set_items(
            vec![item("one"), item("two")],
            0,
            QueueAuthority::Local,
        );
        assert_eq!(queue.position_of("library:track:two"), Some(1));
        assert_eq!(queue.position_of("library%3Atrack%3Atwo"), Some(1));
        assert_eq!(queue.position_of("library:track:three"), None);
    }
}
