//! Spotify Connect offload controller output.
//!
//! When offload is enabled the Spotify client renders audio itself on the
//! zone's hardware; this output only controls the remote session. It is
//! not renderable, so the router excludes it from play fan-out, and it
//! claims queue steps because the Spotify queue is remote.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use mramodel::{InputsPort, PlaybackSession, ZoneId};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

pub struct SpotifyControllerOutput {
    zone_id: ZoneId,
    inputs: Arc<dyn InputsPort>,
    offload_enabled: bool,
}

impl SpotifyControllerOutput {
    pub fn new(zone_id: ZoneId, inputs: Arc<dyn InputsPort>, offload_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            zone_id,
            inputs,
            offload_enabled,
        })
    }

    async fn forward(&self, command: &str, value: Option<i64>) -> Result<(), OutputError> {
        self.inputs
            .forward_command(self.zone_id, "spotify", command, value)
            .await
            .map_err(|e| OutputError::action_failed("spotify", command, e.to_string()))
    }
}

#[async_trait]
impl ZoneOutput for SpotifyControllerOutput {
    fn type_name(&self) -> &str {
        "spotify"
    }

    async fn play(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.forward("play", None).await
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.forward("pause", None).await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.forward("play", None).await
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        self.forward("stop", None).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        self.forward("volume", Some(level as i64)).await
    }

    /// Controller outputs never render audio locally.
    fn is_renderable(&self) -> bool {
        false
    }

    async fn step_queue(&self, delta: i64) -> Result<bool, OutputError> {
        if !self.offload_enabled {
            return Ok(false);
        }
        let command = if delta >= 0 { "next" } else { "previous" };
        debug!(zone = %self.zone_id, command, "queue step forwarded to spotify");
        self.forward(command, None).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use mramodel::{PlaybackSource, PortError};

    #[derive(Default)]
    struct RecordingInputs {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InputsPort for RecordingInputs {
        async fn stop_session(
            &self,
            _zone_id: ZoneId,
            _label: &str,
            _reason: &str,
        ) -> Result<(), PortError> {
            Ok(())
        }

        async fn pause_session(&self, _zone_id: ZoneId, _label: &str) -> Result<(), PortError> {
            Ok(())
        }

        async fn resume_session(&self, _zone_id: ZoneId, _label: &str) -> Result<(), PortError> {
            Ok(())
        }

        async fn resolve_input_source(
            &self,
            _zone_id: ZoneId,
            _label: &str,
            _uri: &str,
        ) -> Result<Option<PlaybackSource>, PortError> {
            Ok(None)
        }

        async fn forward_command(
            &self,
            _zone_id: ZoneId,
            _label: &str,
            command: &str,
            _value: Option<i64>,
        ) -> Result<(), PortError> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn sync_zone_name(&self, _zone_id: ZoneId, _name: &str) -> Result<(), PortError> {
            Ok(())
        }

        async fn request_linein(&self, _zone_id: ZoneId, _enable: bool) -> Result<(), PortError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_not_renderable() {
        let inputs = Arc::new(RecordingInputs::default());
        let output = SpotifyControllerOutput::new(ZoneId(1), inputs, true);
        assert!(!output.is_renderable());
    }

    #[tokio::test]
    async fn test_step_claims_only_when_offloaded() {
        let inputs = Arc::new(RecordingInputs::default());
        let offloaded = SpotifyControllerOutput::new(ZoneId(1), inputs.clone(), true);
        assert!(offloaded.step_queue(1).await.unwrap());
        assert_eq!(inputs.commands.lock().unwrap().as_slice(), &["next"]);

        let plain = SpotifyControllerOutput::new(ZoneId(1), inputs.clone(), false);
        assert!(!plain.step_queue(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_backward_step_forwards_previous() {
        let inputs = Arc::new(RecordingInputs::default());
        let output = SpotifyControllerOutput::new(ZoneId(1), inputs.clone(), true);
        output.step_queue(-1).await.unwrap();
        assert_eq!(inputs.commands.lock().unwrap().as_slice(), &["previous"]);
    }
}
