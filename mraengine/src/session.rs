//! One zone session: reader task, profile hubs, subscriber slots.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use mramodel::{PlaybackSource, StreamDescriptor, StreamProfile, ZoneId};

use crate::chunk::EncodedChunk;
use crate::error::EngineError;
use crate::pipes::PcmPipes;
use crate::source::run_source;
use crate::stats::StatsCell;

const SOURCE_CHANNEL_DEPTH: usize = 16;

/// Event published when a session ends on its own.
#[derive(Clone, Debug)]
pub(crate) enum SessionOutcome {
    Ended,
    Failed(EngineError),
}

/// A subscriber's sending side.
///
/// The channel doubles as the bounded ring: when the receiver lags until
/// the channel is full, the slot is dropped rather than stalling the
/// producer.
struct SubscriberSlot {
    id: String,
    label: String,
    tx: mpsc::Sender<Arc<EncodedChunk>>,
}

/// A subscriber's receiving side, handed to an output.
pub struct SubscriberStream {
    pub id: String,
    pub label: String,
    pub profile: StreamProfile,
    pub rx: mpsc::Receiver<Arc<EncodedChunk>>,
}

/// Fan-out point of one encoded sub-stream.
struct ProfileHub {
    profile: StreamProfile,
    subscribers: Mutex<Vec<SubscriberSlot>>,
    /// Rolling window of recent chunks for late joiners.
    backlog: Mutex<VecDeque<Arc<EncodedChunk>>>,
    prime_bytes: usize,
    sequence: Mutex<u64>,
}

impl ProfileHub {
    fn new(profile: StreamProfile, prime_bytes: usize) -> Self {
        Self {
            profile,
            subscribers: Mutex::new(Vec::new()),
            backlog: Mutex::new(VecDeque::new()),
            prime_bytes,
            sequence: Mutex::new(0),
        }
    }

    fn publish(&self, payload: &[u8], stats: &StatsCell) {
        let chunk = {
            let mut sequence = self.sequence.lock().unwrap();
            let chunk = Arc::new(EncodedChunk::new(self.profile, payload.to_vec(), *sequence));
            *sequence += 1;
            chunk
        };

        {
            let mut backlog = self.backlog.lock().unwrap();
            backlog.push_back(chunk.clone());
            let mut bytes: usize = backlog.iter().map(|c| c.len()).sum();
            while bytes > self.prime_bytes && backlog.len() > 1 {
                if let Some(evicted) = backlog.pop_front() {
                    bytes -= evicted.len();
                }
            }
            stats.buffered_bytes.store(bytes as u64, Ordering::Relaxed);
        }

        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|slot| match slot.tx.try_send(chunk.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    subscriber = %slot.label,
                    id = %slot.id,
                    "subscriber ring overflow, dropping subscriber"
                );
                stats.subscriber_drops.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        stats.subscribers.store(subscribers.len(), Ordering::Relaxed);
    }

    fn attach(
        &self,
        label: &str,
        prime_with_buffer: bool,
        ring_chunks: usize,
        stats: &StatsCell,
    ) -> SubscriberStream {
        let (tx, rx) = mpsc::channel(ring_chunks.max(2));
        let id = Uuid::new_v4().to_string();

        if prime_with_buffer {
            let backlog = self.backlog.lock().unwrap();
            for chunk in backlog.iter() {
                // Priming never drops the fresh subscriber; the ring is
                // sized at least as large as the backlog window.
                if tx.try_send(chunk.clone()).is_err() {
                    break;
                }
            }
        }

        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.push(SubscriberSlot {
            id: id.clone(),
            label: label.to_string(),
            tx,
        });
        stats.subscribers.store(subscribers.len(), Ordering::Relaxed);

        SubscriberStream {
            id,
            label: label.to_string(),
            profile: self.profile,
            rx,
        }
    }

    fn discard_subscribers(&self, stats: &StatsCell) {
        self.subscribers.lock().unwrap().clear();
        stats.subscribers.store(0, Ordering::Relaxed);
    }
}

/// One running pipeline.
pub(crate) struct ZoneSession {
    pub zone_id: ZoneId,
    pub label: String,
    pub source: PlaybackSource,
    pub streams: Vec<StreamDescriptor>,
    hubs: HashMap<StreamProfile, ProfileHub>,
    pub token: CancellationToken,
    pub stats: Arc<StatsCell>,
    first_chunk_rx: watch::Receiver<bool>,
    outcome_rx: watch::Receiver<Option<SessionOutcome>>,
}

pub(crate) struct SessionConfig {
    pub profiles: Vec<StreamProfile>,
    pub prebuffer_bytes: usize,
    pub prime_bytes: usize,
}

impl ZoneSession {
    /// Spawns the reader task and returns the session handle.
    pub fn spawn(
        zone_id: ZoneId,
        label: String,
        source: PlaybackSource,
        config: SessionConfig,
        pipes: PcmPipes,
    ) -> Arc<ZoneSession> {
        let token = CancellationToken::new();
        let stats = Arc::new(StatsCell::default());
        let (first_chunk_tx, first_chunk_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let mut hubs = HashMap::new();
        let mut streams = Vec::new();
        for profile in &config.profiles {
            hubs.insert(*profile, ProfileHub::new(*profile, config.prime_bytes));
            streams.push(StreamDescriptor {
                id: Uuid::new_v4().to_string(),
                url: format!("mra://{}/{}", zone_id, profile.as_str()),
                created_at: Utc::now(),
            });
        }

        let session = Arc::new(ZoneSession {
            zone_id,
            label,
            source: source.clone(),
            streams,
            hubs,
            token: token.clone(),
            stats: stats.clone(),
            first_chunk_rx,
            outcome_rx,
        });

        let runner = session.clone();
        let (data_tx, mut data_rx) = mpsc::channel::<Vec<u8>>(SOURCE_CHANNEL_DEPTH);
        let reader_token = token.clone();
        let reader_pipes = pipes;
        let reader_source = source;

        tokio::spawn(async move {
            let reader = tokio::spawn(run_source(
                reader_source,
                reader_pipes,
                reader_token.clone(),
                data_tx,
            ));

            let mut prebuffer: Vec<u8> = Vec::new();
            let mut primed = config.prebuffer_bytes == 0;
            let mut saw_data = false;

            while let Some(data) = data_rx.recv().await {
                saw_data = true;
                if !primed {
                    prebuffer.extend_from_slice(&data);
                    if prebuffer.len() >= config.prebuffer_bytes {
                        runner.publish_all(&prebuffer);
                        prebuffer.clear();
                        primed = true;
                        let _ = first_chunk_tx.send(true);
                    }
                    continue;
                }
                runner.publish_all(&data);
                if !*first_chunk_tx.borrow() {
                    let _ = first_chunk_tx.send(true);
                }
            }

            // Flush whatever the prebuffer collected before a short source
            // ended.
            if !prebuffer.is_empty() {
                runner.publish_all(&prebuffer);
                let _ = first_chunk_tx.send(true);
            }

            let outcome = match reader.await {
                Ok(Ok(())) => {
                    debug!(zone = %runner.zone_id, saw_data, "pipeline source finished");
                    SessionOutcome::Ended
                }
                Ok(Err(e)) => {
                    runner.stats.record_error(e.to_string());
                    SessionOutcome::Failed(e)
                }
                Err(e) => {
                    let err = EngineError::SourceFailed(format!("reader task panicked: {e}"));
                    runner.stats.record_error(err.to_string());
                    SessionOutcome::Failed(err)
                }
            };
            let _ = outcome_tx.send(Some(outcome));
        });

        session
    }

    fn publish_all(&self, payload: &[u8]) {
        self.stats
            .total_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        for hub in self.hubs.values() {
            hub.publish(payload, &self.stats);
        }
    }

    pub fn attach_subscriber(
        &self,
        profile: StreamProfile,
        label: &str,
        prime_with_buffer: bool,
        ring_chunks: usize,
    ) -> Result<SubscriberStream, EngineError> {
        let hub = self
            .hubs
            .get(&profile)
            .ok_or(EngineError::NoProfile(self.zone_id, profile))?;
        Ok(hub.attach(label, prime_with_buffer, ring_chunks, &self.stats))
    }

    pub fn has_profile(&self, profile: StreamProfile) -> bool {
        self.hubs.contains_key(&profile)
    }

    /// Waits until the first encoded chunk of `profile` is available.
    pub async fn wait_first_chunk(&self, timeout_ms: u64) -> Result<(), EngineError> {
        let mut rx = self.first_chunk_rx.clone();
        if *rx.borrow() {
            return Ok(());
        }
        let deadline = tokio::time::Duration::from_millis(timeout_ms);
        match tokio::time::timeout(deadline, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        })
        .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                // Channel closed without a chunk: the source failed first.
                match self.outcome_rx.borrow().clone() {
                    Some(SessionOutcome::Failed(e)) => Err(e),
                    _ => Err(EngineError::FirstChunkTimeout(timeout_ms)),
                }
            }
            Err(_) => Err(EngineError::FirstChunkTimeout(timeout_ms)),
        }
    }

    /// Waits for the session to end on its own (EOF or failure).
    pub async fn wait_outcome(&self) -> SessionOutcome {
        let mut rx = self.outcome_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return SessionOutcome::Ended;
            }
        }
    }

    pub fn cancel(&self, discard_subscribers: bool) {
        self.token.cancel();
        if discard_subscribers {
            for hub in self.hubs.values() {
                hub.discard_subscribers(&self.stats);
            }
        }
    }
}
