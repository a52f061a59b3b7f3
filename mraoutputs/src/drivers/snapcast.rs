//! Snapcast output driver.
//!
//! Snapcast serves one logical stream per group. The driver asks the
//! group coordinator for a plan before starting: the leader feeds its
//! encoded stream to the Snapcast server and points every member client
//! id at it; non-leader zones receive `should_play = false` and skip the
//! local start entirely.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use mraengine::{AudioEngine, SubscriberOptions, SubscriberStream};
use mragroups::{GroupError, GroupParticipant, GroupTracker, coordinators::SnapcastCoordinator};
use mramodel::{PlaybackSession, PreferredOutput, StreamProfile, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

/// Opaque Snapcast server control (JSON-RPC wire lives behind it).
#[async_trait]
pub trait SnapcastControl: Send + Sync {
    /// Feeds an encoded stream to the server under `stream_id`.
    async fn start_stream(
        &self,
        stream_id: &str,
        stream: SubscriberStream,
    ) -> Result<(), OutputError>;

    async fn stop_stream(&self, stream_id: &str) -> Result<(), OutputError>;

    /// Points the given client ids at `stream_id`.
    async fn assign_clients(
        &self,
        stream_id: &str,
        client_ids: &[String],
    ) -> Result<(), OutputError>;

    async fn set_client_volume(&self, client_id: &str, level: u32) -> Result<(), OutputError>;
}

pub struct SnapcastOutput {
    zone_id: ZoneId,
    stream_id: String,
    client_ids: Vec<String>,
    control: Arc<dyn SnapcastControl>,
    engine: Arc<AudioEngine>,
    tracker: Arc<GroupTracker>,
    coordinator: Arc<SnapcastCoordinator>,
    active_stream: Mutex<Option<String>>,
}

impl SnapcastOutput {
    pub fn new(
        zone_id: ZoneId,
        stream_id: impl Into<String>,
        client_ids: Vec<String>,
        control: Arc<dyn SnapcastControl>,
        engine: Arc<AudioEngine>,
        tracker: Arc<GroupTracker>,
        coordinator: Arc<SnapcastCoordinator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            zone_id,
            stream_id: stream_id.into(),
            client_ids,
            control,
            engine,
            tracker,
            coordinator,
            active_stream: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ZoneOutput for SnapcastOutput {
    fn type_name(&self) -> &str {
        "snapcast"
    }

    async fn play(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        let record = self.tracker.group_of(self.zone_id);
        let plan = self.coordinator.build_plan(
            self.zone_id,
            record.as_deref(),
            &self.stream_id,
            self.client_ids.clone(),
        );

        // Members always follow the plan's stream id.
        self.control
            .assign_clients(&plan.stream_id, &plan.client_ids)
            .await?;

        if !plan.should_play {
            debug!(zone = %self.zone_id, leader = %plan.leader_zone_id, "snapcast member follows leader stream");
            return Ok(());
        }

        let stream = self.engine.create_stream(
            self.zone_id,
            StreamProfile::Flac,
            SubscriberOptions {
                prime_with_buffer: false,
                label: format!("snapcast-{}", self.zone_id),
            },
        )?;

        info!(zone = %self.zone_id, stream = %plan.stream_id, "snapcast stream starting");
        self.control.start_stream(&plan.stream_id, stream).await?;
        *self.active_stream.lock().unwrap() = Some(plan.stream_id);
        Ok(())
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        // The server keeps the stream; the pipeline stops feeding it.
        Ok(())
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        let active = self.active_stream.lock().unwrap().take();
        if let Some(stream_id) = active {
            self.control.stop_stream(&stream_id).await?;
        }
        Ok(())
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        for client_id in &self.client_ids {
            self.control.set_client_volume(client_id, level).await?;
        }
        Ok(())
    }

    fn preferred_output(&self) -> Option<PreferredOutput> {
        Some(PreferredOutput {
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 96 * 1024,
        })
    }

    fn latency_ms(&self) -> u32 {
        // Snapcast's own sync buffer dominates.
        1000
    }
}

#[async_trait]
impl GroupParticipant for SnapcastOutput {
    fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    fn has_running_session(&self) -> bool {
        self.active_stream.lock().unwrap().is_some()
    }

    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
        let leader_stream = format!("{leader}");
        self.control
            .assign_clients(&leader_stream, &self.client_ids)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;
        Ok(true)
    }

    async fn detach(&self) -> Result<(), GroupError> {
        self.control
            .assign_clients(&self.stream_id, &self.client_ids)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }

    async fn stop_stream(&self) -> Result<(), GroupError> {
        let active = self.active_stream.lock().unwrap().take();
        if let Some(stream_id) = active {
            self.control
                .stop_stream(&stream_id)
                .await
                .map_err(|e| GroupError::AttachFailed {
                    zone: self.zone_id,
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}
