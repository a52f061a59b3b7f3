//! The coordinator-side view of an output driver.

use async_trait::async_trait;

use mramodel::ZoneId;

use crate::error::GroupError;

/// A driver instance a group coordinator knows by zone id.
///
/// Participants are weak collaborators: the coordinator never owns the
/// driver and the driver never references the coordinator back. All calls
/// are addressed to the participant's own zone.
#[async_trait]
pub trait GroupParticipant: Send + Sync {
    fn zone_id(&self) -> ZoneId;

    /// True when the participant currently drives a running output session.
    fn has_running_session(&self) -> bool;

    /// Attaches this participant's sender to the leader's flow, replaying
    /// buffered audio where the transport supports it. Returns `true` when
    /// the attach succeeded and local playback must be skipped.
    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError>;

    /// Detaches from the current flow (stop or regroup).
    async fn detach(&self) -> Result<(), GroupError>;

    /// Stops any stream this participant drives (group dissolution).
    async fn stop_stream(&self) -> Result<(), GroupError>;
}
