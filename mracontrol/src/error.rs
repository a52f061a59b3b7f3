use thiserror::Error;

use mramodel::ZoneId;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown zone {0}")]
    UnknownZone(ZoneId),
    #[error("zone {0} is shutting down")]
    ZoneClosed(ZoneId),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("storage: {0}")]
    Storage(String),
}
