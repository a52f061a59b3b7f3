//! Zone queue model.
//!
//! A [`ZoneQueue`] owns the ordered items of one zone together with the
//! shuffle/repeat flags and the queue authority. It is a pure structure:
//! it never starts playback and never talks to providers. The playback
//! coordinator drives it and reacts to the outcomes.
//!
//! Authority model:
//!   - `Local`: the core steps the queue on end-of-track.
//!   - `Remote(tag)`: an external provider owns progression; the core
//!     mirrors its snapshots through [`ZoneQueue::update_from_output`].

mod error;
mod zone_queue;

pub use error::QueueError;
pub use zone_queue::{AdvanceOutcome, QueueView, SnapshotOutcome, ZoneQueue};
