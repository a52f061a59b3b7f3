use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("queue is empty")]
    Empty,
    #[error("stale fill token {token} (current {current})")]
    StaleFillToken { token: u64, current: u64 },
}
