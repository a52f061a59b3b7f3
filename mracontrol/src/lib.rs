//! The playback core: zone repository, per-zone coordinator, input
//! adapters, and persisted favorites/recents.
//!
//! Concurrency model: every zone is a single-writer actor. All mutations
//! of a [`context::ZoneContext`] travel as [`coordinator::ZoneMsg`]
//! messages through one `mpsc` channel consumed by one task, which makes
//! state updates a prefix-closed total order per zone. Zones are
//! independent of each other.

mod commands;
mod context;
mod coordinator;
mod error;
mod inputs;
mod plan;
mod storage;
mod throttle;
mod worker;

pub use commands::ZoneCommand;
pub use context::{ZoneConfig, ZoneContext};
pub use coordinator::{PlayOptions, ZoneHandle, ZoneMsg, ZoneRepository, ZoneRepositoryBuilder};
pub use error::ControlError;
pub use inputs::InputAdapters;
pub use plan::PlaybackPlan;
pub use storage::ZoneStorage;
