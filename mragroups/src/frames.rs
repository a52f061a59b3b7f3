//! Timestamped frame buffer for late joiners.
//!
//! Multicast-style transports stamp PCM frames with server time and keep
//! a short window of future frames buffered. When a member joins
//! mid-stream, the frames whose timestamps are still ahead of the member's
//! clock are replayed so its audio aligns with the group.

use std::collections::VecDeque;
use std::sync::Mutex;

/// One PCM frame with its scheduled server-time in milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedFrame {
    pub play_at_ms: u64,
    pub payload: Vec<u8>,
}

/// Bounded buffer of recent frames, ordered by timestamp.
pub struct FrameBuffer {
    frames: Mutex<VecDeque<TimedFrame>>,
    /// Frames older than `now - lead_window_ms` are evicted.
    lead_window_ms: u64,
    max_frames: usize,
}

impl FrameBuffer {
    pub fn new(lead_window_ms: u64, max_frames: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            lead_window_ms,
            max_frames,
        }
    }

    /// Pushes a frame, evicting everything that left the lead window.
    pub fn push(&self, frame: TimedFrame, now_ms: u64) {
        let mut frames = self.frames.lock().unwrap();
        frames.push_back(frame);

        let horizon = now_ms.saturating_sub(self.lead_window_ms);
        while let Some(front) = frames.front() {
            if front.play_at_ms < horizon || frames.len() > self.max_frames {
                frames.pop_front();
            } else {
                break;
            }
        }
    }

    /// Frames still scheduled in the future relative to `now_ms`, for
    /// replay to a late joiner.
    pub fn replay_for_join(&self, now_ms: u64) -> Vec<TimedFrame> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|frame| frame.play_at_ms >= now_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(at: u64) -> TimedFrame {
        TimedFrame {
            play_at_ms: at,
            payload: vec![0u8; 4],
        }
    }

    #[test]
    fn test_replay_only_future_frames() {
        let buffer = FrameBuffer::new(150, 64);
        buffer.push(frame(1000), 1000);
        buffer.push(frame(1020), 1000);
        buffer.push(frame(1040), 1000);

        let replayed = buffer.replay_for_join(1020);
        assert_eq!(replayed.len(), 2);
        assert!(replayed.iter().all(|f| f.play_at_ms >= 1020));
    }

    #[test]
    fn test_old_frames_evicted() {
        let buffer = FrameBuffer::new(150, 64);
        buffer.push(frame(1000), 1000);
        buffer.push(frame(1500), 1500);
        // 1000 < 1500 - 150, evicted.
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_capacity_bounded() {
        let buffer = FrameBuffer::new(10_000, 8);
        for i in 0..32 {
            buffer.push(frame(1000 + i), 1000);
        }
        assert!(buffer.len() <= 8);
    }
}
