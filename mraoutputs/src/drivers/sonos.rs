//! Sonos output driver.
//!
//! Transport control goes through the same AVTransport surface as DLNA;
//! grouping uses Sonos' coordinator model: a member joins by setting its
//! transport URI to `x-rincon:<coordinator-uuid>`, and leaves by becoming
//! coordinator of a standalone group.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use mragroups::{GroupError, GroupParticipant};
use mramodel::{PlaybackSession, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;
use crate::soap::SoapClient;

const AVTRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const RENDERING_SERVICE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

/// Shared map of zone id to Sonos device UUID (RINCON_…).
///
/// Sonos outputs register themselves here so a member can resolve its
/// leader's coordinator UUID during a JOIN.
#[derive(Clone, Default)]
pub struct SonosTopology {
    uuids: Arc<Mutex<HashMap<ZoneId, String>>>,
}

impl SonosTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, zone: ZoneId, uuid: impl Into<String>) {
        self.uuids.lock().unwrap().insert(zone, uuid.into());
    }

    pub fn uuid_of(&self, zone: ZoneId) -> Option<String> {
        self.uuids.lock().unwrap().get(&zone).cloned()
    }
}

pub struct SonosOutput {
    zone_id: ZoneId,
    uuid: String,
    avtransport_url: String,
    rendering_url: String,
    soap: SoapClient,
    topology: SonosTopology,
    running: Mutex<bool>,
}

impl SonosOutput {
    pub fn new(
        zone_id: ZoneId,
        uuid: impl Into<String>,
        avtransport_url: String,
        rendering_url: String,
        soap: SoapClient,
        topology: SonosTopology,
    ) -> Arc<Self> {
        let uuid = uuid.into();
        topology.register(zone_id, uuid.clone());
        Arc::new(Self {
            zone_id,
            uuid,
            avtransport_url,
            rendering_url,
            soap,
            topology,
            running: Mutex::new(false),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn avtransport(&self, action: &str, args: &[(&str, &str)]) -> Result<(), OutputError> {
        self.soap
            .invoke(&self.avtransport_url, AVTRANSPORT_SERVICE, action, args)
            .await
            .map(|_| ())
            .map_err(|e| OutputError::action_failed("sonos", action, e.to_string()))
    }

    /// JOIN: point this device's transport at the coordinator.
    pub async fn join_coordinator(&self, coordinator_uuid: &str) -> Result<(), OutputError> {
        let uri = format!("x-rincon:{coordinator_uuid}");
        info!(zone = %self.zone_id, coordinator = coordinator_uuid, "sonos join");
        self.avtransport(
            "SetAVTransportURI",
            &[("InstanceID", "0"), ("CurrentURI", &uri), ("CurrentURIMetaData", "")],
        )
        .await
    }

    /// LEAVE: become coordinator of a standalone group.
    pub async fn leave_group(&self) -> Result<(), OutputError> {
        info!(zone = %self.zone_id, "sonos leave");
        self.avtransport(
            "BecomeCoordinatorOfStandaloneGroup",
            &[("InstanceID", "0")],
        )
        .await
    }
}

#[async_trait]
impl ZoneOutput for SonosOutput {
    fn type_name(&self) -> &str {
        "sonos"
    }

    async fn play(&self, session: &PlaybackSession) -> Result<(), OutputError> {
        let url = session
            .streams
            .first()
            .map(|s| s.url.as_str())
            .ok_or_else(|| OutputError::action_failed("sonos", "play", "session has no stream"))?;
        self.avtransport(
            "SetAVTransportURI",
            &[("InstanceID", "0"), ("CurrentURI", url), ("CurrentURIMetaData", "")],
        )
        .await?;
        self.avtransport("Play", &[("InstanceID", "0"), ("Speed", "1")])
            .await?;
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.avtransport("Pause", &[("InstanceID", "0")]).await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.avtransport("Play", &[("InstanceID", "0"), ("Speed", "1")])
            .await
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        *self.running.lock().unwrap() = false;
        self.avtransport("Stop", &[("InstanceID", "0")]).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        let level = level.to_string();
        self.soap
            .invoke(
                &self.rendering_url,
                RENDERING_SERVICE,
                "SetVolume",
                &[
                    ("InstanceID", "0"),
                    ("Channel", "Master"),
                    ("DesiredVolume", &level),
                ],
            )
            .await
            .map(|_| ())
            .map_err(|e| OutputError::action_failed("sonos", "SetVolume", e.to_string()))
    }

    fn latency_ms(&self) -> u32 {
        75
    }
}

#[async_trait]
impl GroupParticipant for SonosOutput {
    fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    fn has_running_session(&self) -> bool {
        *self.running.lock().unwrap()
    }

    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
        let Some(coordinator_uuid) = self.topology.uuid_of(leader) else {
            return Ok(false);
        };
        self.join_coordinator(&coordinator_uuid)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;
        Ok(true)
    }

    async fn detach(&self) -> Result<(), GroupError> {
        self.leave_group().await.map_err(|e| GroupError::AttachFailed {
            zone: self.zone_id,
            message: e.to_string(),
        })
    }

    async fn stop_stream(&self) -> Result<(), GroupError> {
        *self.running.lock().unwrap() = false;
        // Leaving the group also stops group playback on this device.
        self.leave_group().await.map_err(|e| GroupError::AttachFailed {
            zone: self.zone_id,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_roundtrip() {
        let topology = SonosTopology::new();
        topology.register(ZoneId(1), "RINCON_AAA");
        assert_eq!(topology.uuid_of(ZoneId(1)).as_deref(), Some("RINCON_AAA"));
        assert!(topology.uuid_of(ZoneId(2)).is_none());
    }

    #[tokio::test]
    async fn test_attach_without_known_leader_defers() {
        let topology = SonosTopology::new();
        let output = SonosOutput::new(
            ZoneId(2),
            "RINCON_BBB",
            "http://r/av".into(),
            "http://r/rc".into(),
            SoapClient::new(std::time::Duration::from_millis(200)),
            topology,
        );
        // Leader uuid unknown: no wire call, attach reports "not joined".
        assert_eq!(output.attach_to_leader(ZoneId(9)).await.unwrap(), false);
    }
}
