//! Shared data model for the MRAudio workspace.
//!
//! This crate defines the types exchanged between the playback coordinator,
//! the queue controller, the audio engine, the output drivers, and the group
//! coordinators:
//!
//! - zone identity and observable state,
//! - the audiopath grammar (provider classification, wrapped-form decoding,
//!   parent-context parsing),
//! - track metadata and cover payloads,
//! - playback sources, sessions, and stream profiles,
//! - group records and their change events,
//! - the port traits towards external collaborators (content providers,
//!   input receivers, the notifier, persisted storage).
//!
//! No behavior beyond parsing/normalization lives here; the crates that own
//! the respective components implement it.

pub mod audiopath;
pub mod errors;
pub mod events;
pub mod group;
pub mod metadata;
pub mod ports;
pub mod queue_item;
pub mod session;
pub mod source;
pub mod zone;

pub use audiopath::{
    ParentContext, ParsedPlayUri, Provider, decode_wrapped, normalize_audiopath, parse_play_uri,
    sanitize_station,
};
pub use errors::{ErrorSource, ModelError, PlaybackError, PlaybackErrorKind, StopReason};
pub use events::{InputEvent, NotifierEvent, OutputStateEvent};
pub use group::{GroupChangeEvent, GroupChangeKind, GroupRecord};
pub use metadata::{CoverArtPayload, TrackMetadata};
pub use ports::{
    ContentPort, InputsPort, NotifierPort, PortError, QueueBuildRequest, ResolvedMetadata,
    ResolvedSource, SourceRequest, StoragePort,
};
pub use queue_item::{QueueAuthority, QueueItem, RepeatMode};
pub use session::{PlaybackSession, SessionState, StreamDescriptor};
pub use source::{PlaybackSource, PreferredOutput, StreamProfile};
pub use zone::{AudioType, InputMode, PlaybackMode, PowerState, VolumePolicy, ZoneId, ZoneState};
