//! Lifecycle fan-out to a zone's outputs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mramodel::{PlaybackSession, VolumePolicy, ZoneId};

use crate::capabilities::{OutputAction, ZoneOutput};
use crate::error::OutputError;

/// Hook invoked when one output fails an action.
pub type OutputErrorHook<'a> = &'a (dyn Fn(ZoneId, &str, String) + Send + Sync);

/// Sequential dispatcher with per-output wall-clock bounds.
///
/// Guarantees:
/// - outputs are called strictly in the caller-supplied order,
/// - one output's error or timeout never prevents subsequent outputs from
///   being invoked,
/// - a blocking output cannot stall the caller beyond the configured
///   per-output bound.
pub struct OutputRouter {
    dispatch_timeout: Duration,
}

impl OutputRouter {
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self { dispatch_timeout }
    }

    async fn invoke(
        &self,
        output: &Arc<dyn ZoneOutput>,
        action: OutputAction,
        session: Option<&PlaybackSession>,
    ) -> Result<(), OutputError> {
        let call = async {
            match (action, session) {
                (OutputAction::Play, Some(session)) => output.play(session).await,
                (OutputAction::Pause, Some(session)) => output.pause(session).await,
                (OutputAction::Resume, Some(session)) => output.resume(session).await,
                (OutputAction::Stop, session) => output.stop(session).await,
                (_, None) => Err(OutputError::action_failed(
                    output.type_name(),
                    action.as_str(),
                    "no session",
                )),
            }
        };

        match tokio::time::timeout(self.dispatch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OutputError::Timeout {
                output: output.type_name().to_string(),
                action: action.as_str().to_string(),
                timeout_ms: self.dispatch_timeout.as_millis() as u64,
            }),
        }
    }

    /// Dispatches `action` to each output in order.
    ///
    /// Errors are reported through `on_error` and do not abort the
    /// dispatch; on `stop` they are only logged. Returns the number of
    /// outputs that succeeded.
    pub async fn dispatch_outputs(
        &self,
        zone_id: ZoneId,
        outputs: &[Arc<dyn ZoneOutput>],
        action: OutputAction,
        session: Option<&PlaybackSession>,
        on_error: OutputErrorHook<'_>,
    ) -> usize {
        let mut succeeded = 0;
        for output in outputs {
            match self.invoke(output, action, session).await {
                Ok(()) => {
                    debug!(zone = %zone_id, output = output.type_name(), action = action.as_str(), "output action ok");
                    succeeded += 1;
                }
                Err(e) => {
                    if action == OutputAction::Stop {
                        warn!(zone = %zone_id, output = output.type_name(), error = %e, "stop failed");
                    } else {
                        warn!(zone = %zone_id, output = output.type_name(), action = action.as_str(), error = %e, "output action failed");
                        on_error(zone_id, output.type_name(), e.to_string());
                    }
                }
            }
        }
        succeeded
    }

    /// Applies the zone volume policy and fans the clamped level out.
    /// Returns the applied level.
    pub async fn dispatch_volume(
        &self,
        zone_id: ZoneId,
        outputs: &[Arc<dyn ZoneOutput>],
        policy: &VolumePolicy,
        level: i64,
        on_error: OutputErrorHook<'_>,
    ) -> u32 {
        let clamped = policy.clamp(level);
        for output in outputs {
            let call = output.set_volume(clamped);
            match tokio::time::timeout(self.dispatch_timeout, call).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => on_error(zone_id, output.type_name(), e.to_string()),
                Err(_) => on_error(
                    zone_id,
                    output.type_name(),
                    format!("set_volume timed out after {:?}", self.dispatch_timeout),
                ),
            }
        }
        clamped
    }

    /// Offers an explicit queue step to the outputs.
    ///
    /// Returns `true` iff at least one output claimed ownership; the caller
    /// steps the local queue otherwise.
    pub async fn dispatch_queue_step(
        &self,
        outputs: &[Arc<dyn ZoneOutput>],
        delta: i64,
    ) -> bool {
        let mut claimed = false;
        for output in outputs {
            match tokio::time::timeout(self.dispatch_timeout, output.step_queue(delta)).await {
                Ok(Ok(true)) => claimed = true,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    warn!(output = output.type_name(), error = %e, "queue step failed")
                }
                Err(_) => warn!(output = output.type_name(), "queue step timed out"),
            }
        }
        claimed
    }

    /// Filters to outputs able to render audio (controller-style outputs
    /// are excluded from play dispatch).
    pub fn select_play_outputs(outputs: &[Arc<dyn ZoneOutput>]) -> Vec<Arc<dyn ZoneOutput>> {
        outputs
            .iter()
            .filter(|output| output.is_renderable())
            .cloned()
            .collect()
    }
}
