//! The output capability surface.

use async_trait::async_trait;

use mramodel::{PlaybackSession, PreferredOutput};

use crate::error::OutputError;

/// Lifecycle action dispatched to a zone's outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputAction {
    Play,
    Pause,
    Resume,
    Stop,
}

impl OutputAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputAction::Play => "play",
            OutputAction::Pause => "pause",
            OutputAction::Resume => "resume",
            OutputAction::Stop => "stop",
        }
    }
}

/// A renderer bound to a zone.
///
/// Optional capabilities come with conservative defaults: an output that
/// cannot report a preferred format, does not own queue stepping, and
/// renders audio itself only needs the five lifecycle methods.
#[async_trait]
pub trait ZoneOutput: Send + Sync {
    /// Transport type tag ("airplay", "snapcast", ...).
    fn type_name(&self) -> &str;

    async fn play(&self, session: &PlaybackSession) -> Result<(), OutputError>;

    async fn pause(&self, session: &PlaybackSession) -> Result<(), OutputError>;

    async fn resume(&self, session: &PlaybackSession) -> Result<(), OutputError>;

    async fn stop(&self, session: Option<&PlaybackSession>) -> Result<(), OutputError>;

    /// Volume after zone-policy clamping, 0..=100.
    async fn set_volume(&self, level: u32) -> Result<(), OutputError>;

    /// Optional metadata push for transports with their own display.
    async fn update_metadata(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        Ok(())
    }

    /// Preferred input format of this renderer, when it has one.
    fn preferred_output(&self) -> Option<PreferredOutput> {
        None
    }

    /// Render latency used for group alignment.
    fn latency_ms(&self) -> u32 {
        0
    }

    /// Whether this output renders audio itself. Controller-style outputs
    /// (e.g. the Spotify offload controller) return false and are excluded
    /// from play dispatch.
    fn is_renderable(&self) -> bool {
        true
    }

    /// Forwards an explicit queue step to the output.
    ///
    /// Returns `true` when the output claims ownership of the step (the
    /// external queue is remote and the output forwarded it); the caller
    /// then must NOT step the local queue.
    async fn step_queue(&self, _delta: i64) -> Result<bool, OutputError> {
        Ok(false)
    }

    /// Releases the resources held by the driver.
    async fn dispose(&self) -> Result<(), OutputError> {
        Ok(())
    }
}
