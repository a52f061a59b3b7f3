//! Sendspin output driver (proprietary PCM multicast transport).
//!
//! The leader stamps PCM frames with server time and keeps a lead window
//! of future frames buffered in the group coordinator; members mirror the
//! same client-id stream, and late joiners get the buffered future frames
//! replayed so their audio aligns.
//!
//! Outbound connection policy:
//! - more than three consecutive DNS failures suppress reconnects for
//!   60 seconds,
//! - goodbye reasons `another_server`, `shutdown`, and `user_request`
//!   suppress reconnection permanently until the output is reconfigured
//!   (`dispose` + rebuild clears the latch).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mraengine::{AudioEngine, SubscriberOptions};
use mragroups::{GroupError, GroupParticipant, TimedFrame, coordinators::SendspinCoordinator};
use mramodel::{PlaybackSession, PreferredOutput, StreamProfile, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

const DNS_FAILURE_LIMIT: u32 = 3;
const DNS_SUPPRESSION: Duration = Duration::from_secs(60);

/// Reconnect gate for the outbound connector.
#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    dns_failures: u32,
    suppressed_until: Option<Instant>,
    permanent_reason: Option<String>,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a DNS resolution failure; beyond the limit, reconnects are
    /// suppressed for a minute.
    pub fn record_dns_failure(&mut self) {
        self.dns_failures += 1;
        if self.dns_failures > DNS_FAILURE_LIMIT {
            self.suppressed_until = Some(Instant::now() + DNS_SUPPRESSION);
        }
    }

    pub fn record_success(&mut self) {
        self.dns_failures = 0;
        self.suppressed_until = None;
    }

    /// Records a goodbye from the peer. Some reasons latch permanently.
    pub fn record_goodbye(&mut self, reason: &str) {
        if matches!(reason, "another_server" | "shutdown" | "user_request") {
            self.permanent_reason = Some(reason.to_string());
        }
    }

    /// Whether an outbound connection attempt is currently allowed.
    pub fn may_connect(&self, now: Instant) -> bool {
        if self.permanent_reason.is_some() {
            return false;
        }
        match self.suppressed_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    pub fn suppression_reason(&self) -> Option<&str> {
        if let Some(reason) = &self.permanent_reason {
            return Some(reason);
        }
        self.suppressed_until
            .filter(|until| Instant::now() < *until)
            .map(|_| "dns_failures")
    }

    /// Reconfiguration clears every latch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Opaque Sendspin wire sender.
#[async_trait]
pub trait SendspinSender: Send + Sync {
    /// Resolves and connects the outbound endpoint.
    async fn connect(&self) -> Result<(), OutputError>;

    /// Emits one timestamped frame for `client_id`.
    async fn send_frame(&self, client_id: &str, frame: TimedFrame) -> Result<(), OutputError>;

    async fn send_volume(&self, client_id: &str, level: u32) -> Result<(), OutputError>;

    async fn disconnect(&self) -> Result<(), OutputError>;

    /// Server-time now, in milliseconds.
    fn server_time_ms(&self) -> u64;
}

pub struct SendspinOutput {
    zone_id: ZoneId,
    client_id: String,
    sender: Arc<dyn SendspinSender>,
    engine: Arc<AudioEngine>,
    coordinator: Arc<SendspinCoordinator>,
    lead_window_ms: u64,
    policy: Mutex<ReconnectPolicy>,
    pump_token: Mutex<Option<CancellationToken>>,
}

impl SendspinOutput {
    pub fn new(
        zone_id: ZoneId,
        client_id: impl Into<String>,
        sender: Arc<dyn SendspinSender>,
        engine: Arc<AudioEngine>,
        coordinator: Arc<SendspinCoordinator>,
        lead_window_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            zone_id,
            client_id: client_id.into(),
            sender,
            engine,
            coordinator,
            lead_window_ms,
            policy: Mutex::new(ReconnectPolicy::new()),
            pump_token: Mutex::new(None),
        })
    }

    /// Feeds a peer-reported goodbye into the reconnect policy.
    pub fn on_goodbye(&self, reason: &str) {
        info!(zone = %self.zone_id, reason, "sendspin goodbye");
        self.policy.lock().unwrap().record_goodbye(reason);
    }

    pub fn on_dns_failure(&self) {
        self.policy.lock().unwrap().record_dns_failure();
    }

    fn ensure_may_connect(&self) -> Result<(), OutputError> {
        let policy = self.policy.lock().unwrap();
        if !policy.may_connect(Instant::now()) {
            return Err(OutputError::ReconnectSuppressed {
                output: "sendspin".to_string(),
                reason: policy.suppression_reason().unwrap_or("unknown").to_string(),
            });
        }
        Ok(())
    }

    fn stop_pump(&self) {
        if let Some(token) = self.pump_token.lock().unwrap().take() {
            token.cancel();
        }
    }
}

#[async_trait]
impl ZoneOutput for SendspinOutput {
    fn type_name(&self) -> &str {
        "sendspin"
    }

    async fn play(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.ensure_may_connect()?;
        self.sender.connect().await.map_err(|e| {
            warn!(zone = %self.zone_id, error = %e, "sendspin connect failed");
            e
        })?;
        self.policy.lock().unwrap().record_success();

        let mut stream = self.engine.create_stream(
            self.zone_id,
            StreamProfile::Pcm,
            SubscriberOptions {
                prime_with_buffer: false,
                label: format!("sendspin-{}", self.zone_id),
            },
        )?;

        // Pump task: stamp each chunk one lead window ahead of server time,
        // record it for late joiners, and put it on the wire.
        self.stop_pump();
        let token = CancellationToken::new();
        *self.pump_token.lock().unwrap() = Some(token.clone());

        let sender = self.sender.clone();
        let coordinator = self.coordinator.clone();
        let zone = self.zone_id;
        let client_id = self.client_id.clone();
        let lead = self.lead_window_ms;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    chunk = stream.rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        let now = sender.server_time_ms();
                        let frame = TimedFrame {
                            play_at_ms: now + lead,
                            payload: chunk.payload.to_vec(),
                        };
                        coordinator.record_frame(zone, frame.clone(), now);
                        if let Err(e) = sender.send_frame(&client_id, frame).await {
                            warn!(zone = %zone, error = %e, "sendspin frame send failed");
                            break;
                        }
                    }
                }
            }
            debug!(zone = %zone, "sendspin pump ended");
        });

        Ok(())
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        // The pipeline stops producing; the connection stays up.
        Ok(())
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        self.stop_pump();
        self.sender.disconnect().await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        self.sender.send_volume(&self.client_id, level).await
    }

    fn preferred_output(&self) -> Option<PreferredOutput> {
        Some(PreferredOutput {
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 32 * 1024,
        })
    }

    async fn dispose(&self) -> Result<(), OutputError> {
        self.stop_pump();
        self.policy.lock().unwrap().reset();
        self.sender.disconnect().await
    }
}

#[async_trait]
impl GroupParticipant for SendspinOutput {
    fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    fn has_running_session(&self) -> bool {
        self.pump_token.lock().unwrap().is_some()
    }

    async fn attach_to_leader(&self, leader: ZoneId) -> Result<bool, GroupError> {
        // Replay the leader's buffered future frames so this member's
        // clock-aligned start masks the join gap.
        let now = self.sender.server_time_ms();
        let frames = self.coordinator.replay_for_join(leader, now);
        debug!(zone = %self.zone_id, leader = %leader, frames = frames.len(), "sendspin join replay");
        for frame in frames {
            self.sender
                .send_frame(&self.client_id, frame)
                .await
                .map_err(|e| GroupError::AttachFailed {
                    zone: self.zone_id,
                    message: e.to_string(),
                })?;
        }
        Ok(true)
    }

    async fn detach(&self) -> Result<(), GroupError> {
        self.stop_pump();
        Ok(())
    }

    async fn stop_stream(&self) -> Result<(), GroupError> {
        self.stop_pump();
        self.sender
            .disconnect()
            .await
            .map_err(|e| GroupError::AttachFailed {
                zone: self.zone_id,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_suppression_after_limit() {
        let mut policy = ReconnectPolicy::new();
        for _ in 0..3 {
            policy.record_dns_failure();
        }
        assert!(policy.may_connect(Instant::now()));

        policy.record_dns_failure();
        assert!(!policy.may_connect(Instant::now()));
        // The window expires.
        assert!(policy.may_connect(Instant::now() + Duration::from_secs(61)));
    }

    #[test]
    fn test_goodbye_reasons_latch() {
        for reason in ["another_server", "shutdown", "user_request"] {
            let mut policy = ReconnectPolicy::new();
            policy.record_goodbye(reason);
            assert!(!policy.may_connect(Instant::now() + Duration::from_secs(3600)));
            assert_eq!(policy.suppression_reason(), Some(reason));

            policy.reset();
            assert!(policy.may_connect(Instant::now()));
        }
    }

    #[test]
    fn test_benign_goodbye_does_not_latch() {
        let mut policy = ReconnectPolicy::new();
        policy.record_goodbye("network_blip");
        assert!(policy.may_connect(Instant::now()));
    }

    #[test]
    fn test_success_clears_dns_counter() {
        let mut policy = ReconnectPolicy::new();
        for _ in 0..4 {
            policy.record_dns_failure();
        }
        policy.record_success();
        assert!(policy.may_connect(Instant::now()));
    }
}
