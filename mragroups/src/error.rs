use thiserror::Error;

use mramodel::ZoneId;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("zone {0} already belongs to a group led by {1}")]
    AlreadyGrouped(ZoneId, ZoneId),
    #[error("no group led by {0}")]
    NoSuchGroup(ZoneId),
    #[error("participant {0} is not registered")]
    NoParticipant(ZoneId),
    #[error("attach failed for {zone}: {message}")]
    AttachFailed { zone: ZoneId, message: String },
}
