//! AirPlay output driver.
//!
//! Policies owned here:
//! - protocol detection (AirPlay 2 vs legacy RAOP) from discovery data or
//!   an explicit override,
//! - one long-lived flow per leader zone with a sub-second rolling backlog
//!   so a mid-stream member join can be primed without an audible gap,
//! - a start-NTP lead proportional to the number of group members,
//! - a bounded retry loop while the PCM stream is not yet ready.
//!
//! The RAOP/AirPlay wire protocol itself lives behind [`AirplaySender`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use mraengine::{AudioEngine, SubscriberOptions, SubscriberStream};
use mragroups::{GroupError, GroupParticipant, GroupTracker, coordinators::AirplayCoordinator};
use mramodel::{PlaybackSession, PreferredOutput, StreamProfile, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

const START_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Wire protocol used by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirplayProtocol {
    AirPlay2,
    Raop,
}

impl AirplayProtocol {
    /// Detects the protocol from the discovery model string, honoring an
    /// explicit override first.
    pub fn detect(model: &str, override_protocol: Option<AirplayProtocol>) -> AirplayProtocol {
        if let Some(forced) = override_protocol {
            return forced;
        }
        // AirPlay 2 capable devices advertise a features bitmask model;
        // legacy speakers identify as AirPort/RAOP.
        let lowered = model.to_ascii_lowercase();
        if lowered.contains("airport") || lowered.contains("raop") {
            AirplayProtocol::Raop
        } else {
            AirplayProtocol::AirPlay2
        }
    }
}

/// Opaque AirPlay wire sender.
#[async_trait]
pub trait AirplaySender: Send + Sync {
    /// Opens the flow towards the renderer and starts consuming `stream`.
    /// `start_ntp_lead_ms` shifts the announced start timestamp forward.
    async fn start_flow(
        &self,
        zone: ZoneId,
        stream: SubscriberStream,
        start_ntp_lead_ms: u64,
    ) -> Result<(), OutputError>;

    /// Attaches a member sender to the running flow of `leader`, fed from
    /// an already-primed stream.
    async fn attach_member(
        &self,
        leader: ZoneId,
        member: ZoneId,
        primed: SubscriberStream,
    ) -> Result<(), OutputError>;

    async fn detach_member(&self, member: ZoneId) -> Result<(), OutputError>;

    async fn flush(&self, zone: ZoneId) -> Result<(), OutputError>;

    async fn set_volume(&self, zone: ZoneId, level: u32) -> Result<(), OutputError>;

    async fn teardown(&self, zone: ZoneId) -> Result<(), OutputError>;
}

pub struct AirplayOutput {
    zone_id: ZoneId,
    protocol: AirplayProtocol,
    sender: Arc<dyn AirplaySender>,
    engine: Arc<AudioEngine>,
    tracker: Arc<GroupTracker>,
    coordinator: Arc<AirplayCoordinator>,
    max_start_retries: u32,
    flow_running: Mutex<bool>,
}

impl AirplayOutput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        zone_id: ZoneId,
        model: &str,
        override_protocol: Option<AirplayProtocol>,
        sender: Arc<dyn AirplaySender>,
        engine: Arc<AudioEngine>,
        tracker: Arc<GroupTracker>,
        coordinator: Arc<AirplayCoordinator>,
        max_start_retries: u32,
    ) -> Arc<Self> {
        let protocol = AirplayProtocol::detect(model, override_protocol);
        Arc::new(Self {
            zone_id,
            protocol,
            sender,
            engine,
            tracker,
            coordinator,
            max_start_retries,
            flow_running: Mutex::new(false),
        })
    }

    pub fn protocol(&self) -> AirplayProtocol {
        self.protocol
    }

    /// Waits for PCM availability, retrying at one-second intervals.
    async fn wait_pcm_ready(&self) -> Result<(), OutputError> {
        for attempt in 0..self.max_start_retries {
            match self
                .engine
                .wait_for_first_chunk(self.zone_id, StreamProfile::Pcm, Some(900))
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(zone = %self.zone_id, attempt, error = %e, "pcm not ready yet");
                    tokio::time::sleep(START_RETRY_INTERVAL).await;
                }
            }
        }
        Err(OutputError::StreamNotReady {
            output: "airplay".to_string(),
        })
    }

    fn member_count(&self) -> usize {
        self.tracker
            .group_of(self.zone_id)
            .map(|record| record.members.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ZoneOutput for AirplayOutput {
    fn type_name(&self) -> &str {
        "airplay"
    }

    async fn play(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        // Grouped member with a running leader flow: attach instead of a
        // local start.
        if let Some(record) = self.tracker.group_of(self.zone_id) {
            if self.coordinator.try_join_leader(&record, self.zone_id).await {
                info!(zone = %self.zone_id, "joined leader flow, skipping local start");
                return Ok(());
            }
        }

        self.wait_pcm_ready().await?;

        let stream = self.engine.create_stream(
            self.zone_id,
            StreamProfile::Pcm,
            SubscriberOptions {
                prime_with_buffer: false,
                label: format!("airplay-{}", self.zone_id),
            },
        )?;

        let lead = AirplayCoordinator::start_lead_ms(self.member_count());
        self.sender.start_flow(self.zone_id, stream, lead).await?;
        *self.flow_running.lock().unwrap() = true;

        // Attach grouped members now that the flow exists.
        if let Some(record) = self.tracker.record(self.zone_id) {
            self.coordinator
                .sync_group_members(self.zone_id, &record)
                .await;
        }
        Ok(())
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.sender.flush(self.zone_id).await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        // The flow persists over pause; resuming is a no-op at this level
        // because the pipeline resumes feeding the subscriber.
        Ok(())
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        *self.flow_running.lock().unwrap() = false;
        self.coordinator.detach_member(self.zone_id).await;
        self.sender.teardown(self.zone_id).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        self.sender.set_volume(self.zone_id, level).await
    }

    fn preferred_output(&self) -> Option<PreferredOutput> {
        Some(PreferredOutput {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 64 * 1024,
        })
    }

    fn latency_ms(&self) -> u32 {
        match self.protocol {
            AirplayProtocol::AirPlay2 => 100,
            AirplayProtocol::Raop => 250,
        }
    }

    async fn dispose(&self) -> Result<(), OutputError> {
        self.sender.teardown(self.zone_id).await
    }
}

#[async_trait]
impl GroupParticipant for AirplayOutput {
    fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    fn has_running_session(&self) -> bool {
        *self.flow_running.lock().unwrap()
    }

    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
        // Prime from the leader's rolling backlog so the join is gapless.
        let primed = self
            .engine
            .create_stream(
                leader,
                StreamProfile::Pcm,
                SubscriberOptions {
                    prime_with_buffer: true,
                    label: format!("airplay-member-{}", self.zone_id),
                },
            )
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;

        self.sender
            .attach_member(leader, self.zone_id, primed)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })?;
        Ok(true)
    }

    async fn detach(&self) -> Result<(), GroupError> {
        self.sender
            .detach_member(self.zone_id)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }

    async fn stop_stream(&self) -> Result<(), GroupError> {
        *self.flow_running.lock().unwrap() = false;
        self.sender
            .teardown(self.zone_id)
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }
}
