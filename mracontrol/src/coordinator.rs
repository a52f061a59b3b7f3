//! Zone repository and the per-zone message surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use mracovers::CoverStore;
use mraengine::{AudioEngine, EngineEvent};
use mramodel::{
    ContentPort, InputEvent, InputsPort, NotifierPort, OutputStateEvent, PlaybackError,
    QueueItem, TrackMetadata, ZoneId, ZoneState,
};
use mraoutputs::{OutputRouter, ZoneOutput};
use mraqueue::QueueView;

use crate::context::{ZoneConfig, ZoneContext};
use crate::commands::ZoneCommand;
use crate::error::ControlError;
use crate::storage::ZoneStorage;
use crate::worker::ZoneWorker;

const ZONE_CHANNEL_DEPTH: usize = 64;

/// Options accompanying a play request.
#[derive(Clone, Debug, Default)]
pub struct PlayOptions {
    /// Request type from the upstream controller ("track", "serviceplay",
    /// "play", ...). Informational.
    pub content_type: String,
    /// Metadata delivered with the request.
    pub metadata: Option<TrackMetadata>,
    /// Station hint for radio requests.
    pub station: Option<String>,
}

/// One message consumed by a zone's single-writer loop.
///
/// Everything that mutates a [`ZoneContext`] is a variant here; normal
/// updates and error variants travel through the same ordered queue.
pub enum ZoneMsg {
    PlayContent {
        uri: String,
        opts: PlayOptions,
    },
    Command(ZoneCommand),
    Input(InputEvent),
    OutputState(OutputStateEvent),
    /// Queue snapshot observed from an output / remote provider.
    QueueSnapshot {
        items: Vec<QueueItem>,
        current_index: usize,
    },
    /// Background queue fill finished.
    QueueFill {
        token: u64,
        items: Vec<QueueItem>,
    },
    EngineEnded {
        label: String,
    },
    EngineFailed {
        label: String,
        message: String,
    },
    PlaybackError(PlaybackError),
    PlayAlert {
        audiopath: String,
        volume: u32,
    },
    /// An external input session takes over the zone.
    StartInput {
        label: String,
        source: mramodel::PlaybackSource,
        metadata: TrackMetadata,
    },
    GetState(oneshot::Sender<ZoneState>),
    GetQueue {
        start: usize,
        limit: usize,
        reply: oneshot::Sender<QueueView>,
    },
    Shutdown,
}

/// Sender side of one zone's serializer.
#[derive(Clone)]
pub struct ZoneHandle {
    zone_id: ZoneId,
    tx: mpsc::Sender<ZoneMsg>,
}

impl ZoneHandle {
    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    async fn send(&self, msg: ZoneMsg) -> Result<(), ControlError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ControlError::ZoneClosed(self.zone_id))
    }

    pub(crate) async fn send_msg(&self, msg: ZoneMsg) -> Result<(), ControlError> {
        self.send(msg).await
    }

    /// The main play entry: expand, queue, start.
    pub async fn play_content(&self, uri: impl Into<String>, opts: PlayOptions) -> Result<(), ControlError> {
        self.send(ZoneMsg::PlayContent {
            uri: uri.into(),
            opts,
        })
        .await
    }

    pub async fn command(&self, command: ZoneCommand) -> Result<(), ControlError> {
        self.send(ZoneMsg::Command(command)).await
    }

    pub async fn input_event(&self, event: InputEvent) -> Result<(), ControlError> {
        self.send(ZoneMsg::Input(event)).await
    }

    pub async fn output_state(&self, event: OutputStateEvent) -> Result<(), ControlError> {
        self.send(ZoneMsg::OutputState(event)).await
    }

    pub async fn queue_snapshot(
        &self,
        items: Vec<QueueItem>,
        current_index: usize,
    ) -> Result<(), ControlError> {
        self.send(ZoneMsg::QueueSnapshot {
            items,
            current_index,
        })
        .await
    }

    pub async fn play_alert(&self, audiopath: impl Into<String>, volume: u32) -> Result<(), ControlError> {
        self.send(ZoneMsg::PlayAlert {
            audiopath: audiopath.into(),
            volume,
        })
        .await
    }

    pub async fn playback_error(&self, error: PlaybackError) -> Result<(), ControlError> {
        self.send(ZoneMsg::PlaybackError(error)).await
    }

    /// Current observable state (round-trips through the serializer, so
    /// the answer reflects every previously enqueued mutation).
    pub async fn state(&self) -> Result<ZoneState, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.send(ZoneMsg::GetState(tx)).await?;
        rx.await.map_err(|_| ControlError::ZoneClosed(self.zone_id))
    }

    pub async fn queue_view(&self, start: usize, limit: usize) -> Result<QueueView, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.send(ZoneMsg::GetQueue {
            start,
            limit,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ControlError::ZoneClosed(self.zone_id))
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(ZoneMsg::Shutdown).await;
    }
}

/// Shared collaborators handed to every zone worker.
pub struct ZoneRepositoryBuilder {
    pub engine: Arc<AudioEngine>,
    pub content: Arc<dyn ContentPort>,
    pub inputs: Arc<dyn InputsPort>,
    pub notifier: Arc<dyn NotifierPort>,
    pub storage: Arc<ZoneStorage>,
    pub covers: Arc<CoverStore>,
    pub spotify_offload_enabled: bool,
    pub dispatch_timeout: Duration,
    pub handoff_timeout_ms: u64,
}

impl ZoneRepositoryBuilder {
    pub fn build(self) -> Arc<ZoneRepository> {
        Arc::new(ZoneRepository {
            engine: self.engine,
            content: self.content,
            inputs: self.inputs,
            notifier: self.notifier,
            storage: self.storage,
            covers: self.covers,
            spotify_offload_enabled: self.spotify_offload_enabled,
            router: Arc::new(OutputRouter::new(self.dispatch_timeout)),
            handoff_timeout_ms: self.handoff_timeout_ms,
            zones: Mutex::new(HashMap::new()),
        })
    }
}

/// Owns all zone serializers, indexed by zone id.
pub struct ZoneRepository {
    pub(crate) engine: Arc<AudioEngine>,
    pub(crate) content: Arc<dyn ContentPort>,
    pub(crate) inputs: Arc<dyn InputsPort>,
    pub(crate) notifier: Arc<dyn NotifierPort>,
    pub(crate) storage: Arc<ZoneStorage>,
    pub(crate) covers: Arc<CoverStore>,
    pub(crate) spotify_offload_enabled: bool,
    pub(crate) router: Arc<OutputRouter>,
    pub(crate) handoff_timeout_ms: u64,
    zones: Mutex<HashMap<ZoneId, ZoneHandle>>,
}

impl ZoneRepository {
    /// Creates the zone's context and spawns its single-writer loop.
    pub fn spawn_zone(
        self: &Arc<Self>,
        config: ZoneConfig,
        outputs: Vec<Arc<dyn ZoneOutput>>,
    ) -> ZoneHandle {
        let zone_id = config.id;
        let (tx, rx) = mpsc::channel(ZONE_CHANNEL_DEPTH);
        let handle = ZoneHandle { zone_id, tx: tx.clone() };

        let context = ZoneContext::new(config, outputs);
        let worker = ZoneWorker::new(context, self.clone(), tx);
        tokio::spawn(worker.run(rx));

        info!(zone = %zone_id, "zone serializer started");
        self.zones.lock().unwrap().insert(zone_id, handle.clone());
        handle
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<ZoneHandle> {
        self.zones.lock().unwrap().get(&zone_id).cloned()
    }

    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut ids: Vec<ZoneId> = self.zones.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Routes engine end/failure events into the owning zone's serializer.
    ///
    /// Spawn once after construction with the receiver returned by
    /// [`AudioEngine::new`].
    pub fn pump_engine_events(self: &Arc<Self>, mut events: mpsc::Receiver<EngineEvent>) {
        let repository = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let (zone_id, msg) = match event {
                    EngineEvent::Ended { zone_id, label } => {
                        (zone_id, ZoneMsg::EngineEnded { label })
                    }
                    EngineEvent::Failed {
                        zone_id,
                        label,
                        message,
                    } => (zone_id, ZoneMsg::EngineFailed { label, message }),
                };
                let handle = repository.zone(zone_id);
                match handle {
                    Some(handle) => {
                        if handle.send(msg).await.is_err() {
                            warn!(zone = %zone_id, "engine event dropped, zone closed");
                        }
                    }
                    None => warn!(zone = %zone_id, "engine event for unknown zone"),
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        let handles: Vec<ZoneHandle> = self.zones.lock().unwrap().values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}
