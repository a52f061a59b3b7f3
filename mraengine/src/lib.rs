//! Per-zone audio pipelines with subscriber fan-out and handoff.
//!
//! The engine owns one pipeline per zone (two during the overlap window of
//! a handoff). A pipeline reads a [`mramodel::PlaybackSource`] — file,
//! HTTP(S) stream, or an in-process PCM pipe — and fans the resulting
//! chunks out to profile-tagged sub-streams. Outputs attach subscriber
//! streams; every subscriber owns a bounded ring and a slow subscriber is
//! dropped, never backpressured onto the producer.
//!
//! Shutdown is coordinated through `CancellationToken`s: cancelling a
//! session token stops its reader task; subscriber failures never
//! propagate to siblings or to the pipeline.

mod chunk;
mod engine;
mod error;
mod pipes;
mod session;
mod source;
mod stats;

pub use chunk::EncodedChunk;
pub use engine::{
    AudioEngine, EngineEvent, EngineOptions, HandoffOptions, StartOptions, SubscriberOptions,
};
pub use error::EngineError;
pub use pipes::PcmPipes;
pub use session::SubscriberStream;
pub use stats::SessionStats;
