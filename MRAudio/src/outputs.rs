//! Output construction from zone configuration.
//!
//! The wire senders installed here are loopback implementations that log
//! and drain; deployments with real renderer integrations replace them
//! through the same capability traits the drivers consume.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use mraconfig::OutputDefinition;
use mraengine::{AudioEngine, SubscriberStream};
use mragroups::coordinators::{
    AirplayCoordinator, SendspinCoordinator, SlimprotoCoordinator, SnapcastCoordinator,
    SonosCoordinator, TransportCoordinator,
};
use mragroups::{GroupTracker, TimedFrame};
use mramodel::{InputsPort, TrackMetadata, ZoneId};
use mraoutputs::drivers::{
    AirplayOutput, AirplaySender, CastOutput, CastSender, DlnaOutput, SendspinOutput,
    SendspinSender, SlimprotoControl, SlimprotoOutput, SnapcastControl, SnapcastOutput,
    SonosOutput, SonosTopology, SpotifyControllerOutput,
};
use mraoutputs::{OutputError, SoapClient, ZoneOutput};

/// Everything the factory needs to assemble drivers.
pub struct OutputFactory {
    pub engine: Arc<AudioEngine>,
    pub tracker: Arc<GroupTracker>,
    pub airplay: Arc<AirplayCoordinator>,
    pub snapcast: Arc<SnapcastCoordinator>,
    pub slimproto: Arc<SlimprotoCoordinator>,
    pub sendspin: Arc<SendspinCoordinator>,
    pub sonos: Arc<SonosCoordinator>,
    pub sonos_topology: SonosTopology,
    pub inputs: Arc<dyn InputsPort>,
    pub soap: SoapClient,
    pub airplay_start_retries: u32,
    pub sendspin_lead_window_ms: u64,
    pub spotify_offload_enabled: bool,
}

fn param_str(definition: &OutputDefinition, key: &str) -> Option<String> {
    definition
        .params
        .get(&serde_yaml::Value::String(key.to_string()))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

impl OutputFactory {
    /// Builds one output driver and registers it with its coordinator.
    pub fn build(
        &self,
        zone_id: ZoneId,
        definition: &OutputDefinition,
    ) -> Option<Arc<dyn ZoneOutput>> {
        let host = definition.host.clone().unwrap_or_default();

        let output: Arc<dyn ZoneOutput> = match definition.kind.as_str() {
            "airplay" => {
                let model = param_str(definition, "model").unwrap_or_default();
                let driver = AirplayOutput::new(
                    zone_id,
                    &model,
                    None,
                    Arc::new(DrainingAirplaySender),
                    self.engine.clone(),
                    self.tracker.clone(),
                    self.airplay.clone(),
                    self.airplay_start_retries,
                );
                self.airplay.register(zone_id, driver.clone());
                driver
            }
            "snapcast" => {
                let stream_id = param_str(definition, "stream_id")
                    .unwrap_or_else(|| format!("{zone_id}"));
                let client_ids = param_str(definition, "client_id")
                    .map(|id| vec![id])
                    .unwrap_or_default();
                let driver = SnapcastOutput::new(
                    zone_id,
                    stream_id,
                    client_ids,
                    Arc::new(DrainingSnapcastControl),
                    self.engine.clone(),
                    self.tracker.clone(),
                    self.snapcast.clone(),
                );
                self.snapcast.register(zone_id, driver.clone());
                driver
            }
            "slimproto" => {
                let driver = SlimprotoOutput::new(
                    zone_id,
                    Arc::new(DrainingSlimprotoControl),
                    self.engine.clone(),
                    self.tracker.clone(),
                    self.slimproto.clone(),
                );
                self.slimproto.register(zone_id, driver.clone());
                driver
            }
            "sendspin" => {
                let client_id =
                    param_str(definition, "client_id").unwrap_or_else(|| format!("{zone_id}"));
                let driver = SendspinOutput::new(
                    zone_id,
                    client_id,
                    Arc::new(LoopbackSendspinSender),
                    self.engine.clone(),
                    self.sendspin.clone(),
                    self.sendspin_lead_window_ms,
                );
                self.sendspin.register(zone_id, driver.clone());
                driver
            }
            "sonos" => {
                let uuid = param_str(definition, "uuid").unwrap_or_else(|| format!("RINCON_{zone_id}"));
                let driver = SonosOutput::new(
                    zone_id,
                    uuid,
                    format!("http://{host}:1400/MediaRenderer/AVTransport/Control"),
                    format!("http://{host}:1400/MediaRenderer/RenderingControl/Control"),
                    self.soap.clone(),
                    self.sonos_topology.clone(),
                );
                self.sonos.register(zone_id, driver.clone());
                driver
            }
            "cast" => CastOutput::new(Arc::new(LoggingCastSender)),
            "dlna" => {
                let avtransport = param_str(definition, "avtransport_url")
                    .unwrap_or_else(|| format!("http://{host}/AVTransport/Control"));
                let rendering = param_str(definition, "rendering_url")
                    .unwrap_or_else(|| format!("http://{host}/RenderingControl/Control"));
                Arc::new(DlnaOutput::new(avtransport, rendering, self.soap.clone()))
            }
            "spotify" => SpotifyControllerOutput::new(
                zone_id,
                self.inputs.clone(),
                self.spotify_offload_enabled,
            ),
            other => {
                debug!(kind = other, "unknown output type ignored");
                return None;
            }
        };

        info!(zone = %zone_id, kind = %definition.kind, "output driver built");
        Some(output)
    }
}

// ===== loopback wire senders =====

fn drain(mut stream: SubscriberStream, label: &'static str) {
    tokio::spawn(async move {
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.rx.recv().await {
            bytes += chunk.len() as u64;
        }
        debug!(label, bytes, "loopback stream drained");
    });
}

struct DrainingAirplaySender;

#[async_trait]
impl AirplaySender for DrainingAirplaySender {
    async fn start_flow(
        &self,
        zone: ZoneId,
        stream: SubscriberStream,
        start_ntp_lead_ms: u64,
    ) -> Result<(), OutputError> {
        info!(%zone, start_ntp_lead_ms, "airplay flow started (loopback)");
        drain(stream, "airplay");
        Ok(())
    }

    async fn attach_member(
        &self,
        leader: ZoneId,
        member: ZoneId,
        primed: SubscriberStream,
    ) -> Result<(), OutputError> {
        info!(%leader, %member, "airplay member attached (loopback)");
        drain(primed, "airplay-member");
        Ok(())
    }

    async fn detach_member(&self, _member: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn flush(&self, _zone: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn set_volume(&self, _zone: ZoneId, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }

    async fn teardown(&self, _zone: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }
}

struct DrainingSnapcastControl;

#[async_trait]
impl SnapcastControl for DrainingSnapcastControl {
    async fn start_stream(
        &self,
        stream_id: &str,
        stream: SubscriberStream,
    ) -> Result<(), OutputError> {
        info!(stream_id, "snapcast stream started (loopback)");
        drain(stream, "snapcast");
        Ok(())
    }

    async fn stop_stream(&self, _stream_id: &str) -> Result<(), OutputError> {
        Ok(())
    }

    async fn assign_clients(
        &self,
        stream_id: &str,
        client_ids: &[String],
    ) -> Result<(), OutputError> {
        debug!(stream_id, clients = client_ids.len(), "snapcast clients assigned");
        Ok(())
    }

    async fn set_client_volume(&self, _client_id: &str, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }
}

struct DrainingSlimprotoControl;

#[async_trait]
impl SlimprotoControl for DrainingSlimprotoControl {
    async fn stream_to(
        &self,
        player: ZoneId,
        stream: SubscriberStream,
        paused: bool,
    ) -> Result<(), OutputError> {
        info!(%player, paused, "slimproto stream started (loopback)");
        drain(stream, "slimproto");
        Ok(())
    }

    async fn unpause_at(&self, player: ZoneId, jiffies_ms: u64) -> Result<(), OutputError> {
        debug!(%player, jiffies_ms, "slimproto unpause");
        Ok(())
    }

    async fn pause(&self, _player: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self, _player: ZoneId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn set_volume(&self, _player: ZoneId, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }

    fn jiffies_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

struct LoopbackSendspinSender;

#[async_trait]
impl SendspinSender for LoopbackSendspinSender {
    async fn connect(&self) -> Result<(), OutputError> {
        Ok(())
    }

    async fn send_frame(&self, _client_id: &str, _frame: TimedFrame) -> Result<(), OutputError> {
        Ok(())
    }

    async fn send_volume(&self, _client_id: &str, _level: u32) -> Result<(), OutputError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), OutputError> {
        Ok(())
    }

    fn server_time_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

struct LoggingCastSender;

#[async_trait]
impl CastSender for LoggingCastSender {
    async fn load(&self, url: &str, metadata: &TrackMetadata) -> Result<(), OutputError> {
        info!(url, title = ?metadata.title, "cast load (loopback)");
        Ok(())
    }

    async fn play(&self) -> Result<(), OutputError> {
        Ok(())
    }

    async fn pause(&self) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), OutputError> {
        Ok(())
    }

    async fn set_volume_level(&self, _level: f64) -> Result<(), OutputError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Default SOAP client with the renderer probe timeout.
pub fn soap_client(probe_timeout_ms: u64) -> SoapClient {
    SoapClient::new(Duration::from_millis(probe_timeout_ms))
}
