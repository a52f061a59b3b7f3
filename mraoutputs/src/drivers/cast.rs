//! Google Cast output driver.
//!
//! The Cast receiver pulls the encoded stream from the session's HTTP URL;
//! the channel protocol (connect/launch/media namespaces) lives behind the
//! [`CastSender`] capability.

use std::sync::Arc;

use async_trait::async_trait;

use mramodel::{PlaybackSession, PreferredOutput, TrackMetadata};

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;

/// Opaque Cast channel sender.
#[async_trait]
pub trait CastSender: Send + Sync {
    /// Loads a media URL on the default receiver with display metadata.
    async fn load(&self, url: &str, metadata: &TrackMetadata) -> Result<(), OutputError>;

    async fn play(&self) -> Result<(), OutputError>;

    async fn pause(&self) -> Result<(), OutputError>;

    async fn stop(&self) -> Result<(), OutputError>;

    /// Receiver volume, 0.0..=1.0.
    async fn set_volume_level(&self, level: f64) -> Result<(), OutputError>;

    async fn disconnect(&self) -> Result<(), OutputError>;
}

pub struct CastOutput {
    sender: Arc<dyn CastSender>,
}

impl CastOutput {
    pub fn new(sender: Arc<dyn CastSender>) -> Arc<Self> {
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl ZoneOutput for CastOutput {
    fn type_name(&self) -> &str {
        "cast"
    }

    async fn play(&self, session: &PlaybackSession) -> Result<(), OutputError> {
        let url = session
            .streams
            .first()
            .map(|s| s.url.as_str())
            .ok_or_else(|| OutputError::action_failed("cast", "play", "session has no stream"))?;
        self.sender.load(url, &session.metadata).await?;
        self.sender.play().await
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.sender.pause().await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.sender.play().await
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        self.sender.stop().await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        self.sender
            .set_volume_level(f64::from(level.min(100)) / 100.0)
            .await
    }

    async fn update_metadata(&self, session: &PlaybackSession) -> Result<(), OutputError> {
        // Cast shows metadata from the loaded media; reload only when a
        // stream is present.
        if let Some(stream) = session.streams.first() {
            self.sender.load(&stream.url, &session.metadata).await?;
        }
        Ok(())
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
        300
    }

    async fn dispose(&self) -> Result<(), OutputError> {
        self.sender.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        loads: Mutex<Vec<String>>,
        volumes: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl CastSender for RecordingSender {
        async fn load(&self, url: &str, _metadata: &TrackMetadata) -> Result<(), OutputError> {
            self.loads.lock().unwrap().push(url.to_string());
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

        async fn set_volume_level(&self, level: f64) -> Result<(), OutputError> {
            self.volumes.lock().unwrap().push(level);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), OutputError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_play_loads_stream_url() {
        let sender = Arc::new(RecordingSender::default());
        let output = CastOutput::new(sender.clone());
        let session = crate::drivers::test_sessions::playing(1);

        output.play(&session).await.unwrap();
        assert_eq!(
            sender.loads.lock().unwrap().as_slice(),
            &[session.streams[0].url.clone()]
        );
    }

    #[tokio::test]
    async fn test_volume_maps_to_unit_scale() {
        let sender = Arc::new(RecordingSender::default());
        let output = CastOutput::new(sender.clone());

        output.set_volume(50).await.unwrap();
        output.set_volume(200).await.unwrap();
        let volumes = sender.volumes.lock().unwrap();
        assert_eq!(volumes[0], 0.5);
        assert_eq!(volumes[1], 1.0);
    }
}
