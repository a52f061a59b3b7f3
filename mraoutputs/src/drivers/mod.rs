//! Per-transport output drivers.
//!
//! Each driver implements [`crate::ZoneOutput`] on top of an opaque sender
//! capability: the wire protocol (RAOP packetization, SlimProto framing,
//! Snapcast chunking, Cast channels) lives behind a small trait the
//! integration layer provides. What the drivers own is transport policy:
//! retries, grouping, stream priming, and latency handling.

mod airplay;
mod cast;
mod dlna;
mod sendspin;
mod slimproto;
mod snapcast;
mod sonos;
mod spotify;

pub use airplay::{AirplayOutput, AirplayProtocol, AirplaySender};
pub use cast::{CastOutput, CastSender};
pub use dlna::DlnaOutput;
pub use sendspin::{ReconnectPolicy, SendspinOutput, SendspinSender};
pub use slimproto::{SlimprotoControl, SlimprotoOutput};
pub use snapcast::{SnapcastControl, SnapcastOutput};
pub use sonos::{SonosOutput, SonosTopology};
pub use spotify::SpotifyControllerOutput;

#[cfg(test)]
pub(crate) mod test_sessions {
    use chrono::Utc;

    use mramodel::{
        PlaybackSession, PlaybackSource, SessionState, StreamDescriptor, TrackMetadata, ZoneId,
    };

    /// A playing session with one HTTP stream, for driver tests.
    pub fn playing(zone: u32) -> PlaybackSession {
        PlaybackSession {
            zone_id: ZoneId(zone),
            source: "queue".to_string(),
            metadata: TrackMetadata::default(),
            streams: vec![StreamDescriptor {
                id: "stream-1".to_string(),
                url: format!("http://10.0.0.2:7091/stream/{zone}/flac"),
                created_at: Utc::now(),
            }],
            pcm_stream: None,
            state: SessionState::Playing,
            elapsed: 0,
            duration: 0,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            playback_source: PlaybackSource::http("http://example.com/source.mp3"),
        }
    }
}
