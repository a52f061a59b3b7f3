//! Facade the external input receivers call into.
//!
//! Each callback is routed into the owning zone's serializer as a
//! message, so input-side updates observe the same total order as
//! commands and output echoes. Gating on the active input happens inside
//! the serializer.

use std::sync::Arc;

use mracovers::CoverHandle;
use mramodel::{CoverArtPayload, InputEvent, PlaybackSource, TrackMetadata, ZoneId};

use crate::commands::ZoneCommand;
use crate::coordinator::{ZoneMsg, ZoneRepository};
use crate::error::ControlError;

pub struct InputAdapters {
    repo: Arc<ZoneRepository>,
}

impl InputAdapters {
    pub fn new(repo: Arc<ZoneRepository>) -> Self {
        Self { repo }
    }

    fn zone(&self, zone_id: ZoneId) -> Result<crate::coordinator::ZoneHandle, ControlError> {
        self.repo
            .zone(zone_id)
            .ok_or(ControlError::UnknownZone(zone_id))
    }

    /// Enters `input_mode = label` and starts playing the delivered source.
    pub async fn start_playback(
        &self,
        zone_id: ZoneId,
        label: &str,
        source: PlaybackSource,
        metadata: Option<TrackMetadata>,
    ) -> Result<(), ControlError> {
        self.zone(zone_id)?
            .send_msg(ZoneMsg::StartInput {
                label: label.to_string(),
                source,
                metadata: metadata.unwrap_or_default(),
            })
            .await
    }

    pub async fn update_metadata(
        &self,
        zone_id: ZoneId,
        label: &str,
        update: TrackMetadata,
    ) -> Result<(), ControlError> {
        self.zone(zone_id)?
            .input_event(InputEvent::Metadata {
                zone_id,
                label: label.to_string(),
                update,
            })
            .await
    }

    pub async fn update_timing(
        &self,
        zone_id: ZoneId,
        label: &str,
        elapsed: u64,
        duration: u64,
    ) -> Result<(), ControlError> {
        self.zone(zone_id)?
            .input_event(InputEvent::Timing {
                zone_id,
                label: label.to_string(),
                elapsed,
                duration,
            })
            .await
    }

    pub async fn update_volume(
        &self,
        zone_id: ZoneId,
        label: &str,
        volume: u32,
    ) -> Result<(), ControlError> {
        self.zone(zone_id)?
            .input_event(InputEvent::Volume {
                zone_id,
                label: label.to_string(),
                volume,
            })
            .await
    }

    /// Ingests raw cover art and returns the internal HTTP URL renderers
    /// can fetch it from. The state update itself goes through the zone
    /// serializer and is gated on the active input.
    pub async fn update_cover(
        &self,
        zone_id: ZoneId,
        label: &str,
        payload: CoverArtPayload,
    ) -> Result<CoverHandle, ControlError> {
        let handle = self
            .repo
            .covers
            .ingest(&payload)
            .await
            .map_err(|e| ControlError::Storage(e.to_string()))?;

        self.zone(zone_id)?
            .input_event(InputEvent::Cover {
                zone_id,
                label: label.to_string(),
                payload,
            })
            .await?;
        Ok(handle)
    }

    pub async fn end_of_track(&self, zone_id: ZoneId, label: &str) -> Result<(), ControlError> {
        self.zone(zone_id)?
            .input_event(InputEvent::EndOfTrack {
                zone_id,
                label: label.to_string(),
            })
            .await
    }

    pub async fn pause_playback(&self, zone_id: ZoneId) -> Result<(), ControlError> {
        self.zone(zone_id)?.command(ZoneCommand::Pause).await
    }

    pub async fn resume_playback(&self, zone_id: ZoneId) -> Result<(), ControlError> {
        self.zone(zone_id)?.command(ZoneCommand::Play).await
    }

    pub async fn stop_playback(&self, zone_id: ZoneId) -> Result<(), ControlError> {
        self.zone(zone_id)?.command(ZoneCommand::Stop).await
    }
}
