//! The per-zone single-writer loop: the zone state machine.
//!
//! State machine (stop is terminal for a session; the zone itself lives
//! on): play starts or resumes, pause is a no-op from stop, resume from
//! stop restarts the current queue item from its head, and stop is legal
//! from every state. End-of-track under local queue authority advances
//! the queue; under remote authority it is an echo only.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mraengine::{HandoffOptions, StartOptions};
use mramodel::{
    AudioType, ErrorSource, InputEvent, InputMode, NotifierEvent, ParsedPlayUri, PlaybackError,
    PlaybackErrorKind, PlaybackMode, PowerState, Provider, QueueAuthority, QueueBuildRequest,
    QueueItem, SourceRequest, StopReason, StreamProfile, TrackMetadata, normalize_audiopath,
    parse_play_uri, sanitize_station,
};
use mraoutputs::OutputAction;
use mraqueue::{AdvanceOutcome, SnapshotOutcome};

use crate::commands::{ShuffleArg, ZoneCommand};
use crate::context::ZoneContext;
use crate::coordinator::{PlayOptions, ZoneMsg, ZoneRepository};
use crate::plan::PlaybackPlan;

/// Items resolved synchronously; larger containers continue in background.
const SYNC_BUILD_LIMIT: usize = 50;

pub(crate) struct ZoneWorker {
    ctx: ZoneContext,
    repo: Arc<ZoneRepository>,
    self_tx: mpsc::Sender<ZoneMsg>,
}

impl ZoneWorker {
    pub fn new(
        ctx: ZoneContext,
        repo: Arc<ZoneRepository>,
        self_tx: mpsc::Sender<ZoneMsg>,
    ) -> Self {
        Self { ctx, repo, self_tx }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<ZoneMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                ZoneMsg::PlayContent { uri, opts } => self.handle_play_content(uri, opts).await,
                ZoneMsg::Command(command) => self.handle_command(command).await,
                ZoneMsg::Input(event) => self.handle_input(event).await,
                ZoneMsg::OutputState(event) => self.handle_output_state(event),
                ZoneMsg::QueueSnapshot {
                    items,
                    current_index,
                } => self.handle_queue_snapshot(items, current_index),
                ZoneMsg::QueueFill { token, items } => self.handle_queue_fill(token, items),
                ZoneMsg::EngineEnded { label } => self.handle_engine_ended(label).await,
                ZoneMsg::EngineFailed { label, message } => {
                    self.handle_engine_failed(label, message).await
                }
                ZoneMsg::PlaybackError(error) => self.handle_playback_error(error).await,
                ZoneMsg::PlayAlert { audiopath, volume } => {
                    self.handle_play_alert(audiopath, volume).await
                }
                ZoneMsg::StartInput {
                    label,
                    source,
                    metadata,
                } => self.handle_start_input(label, source, metadata).await,
                ZoneMsg::GetState(reply) => {
                    let _ = reply.send(self.ctx.state.clone());
                }
                ZoneMsg::GetQueue {
                    start,
                    limit,
                    reply,
                } => {
                    let _ = reply.send(self.ctx.queue.view(start, limit));
                }
                ZoneMsg::Shutdown => break,
            }
        }
        debug!(zone = %self.ctx.id(), "zone serializer stopped");
    }

    // ===== notifications =====

    fn notify_state(&mut self, force: bool) {
        if force {
            self.ctx.zone_broadcast_gate.reset();
        }
        if self.ctx.zone_broadcast_gate.allow() {
            self.repo.notifier.notify(NotifierEvent::ZoneStateChanged {
                zone_id: self.ctx.id(),
                state: Box::new(self.ctx.state.clone()),
            });
        }
    }

    fn notify_queue(&self) {
        self.repo.notifier.notify(NotifierEvent::QueueUpdated {
            zone_id: self.ctx.id(),
            queue_size: self.ctx.queue.len(),
            current_index: self.ctx.queue.current_index(),
        });
    }

    // ===== play content (§ main entry) =====

    async fn handle_play_content(&mut self, uri: String, opts: PlayOptions) {
        let parsed = parse_play_uri(&uri);
        let target = parsed.target.clone();
        let provider = Provider::classify(&target);
        debug!(zone = %self.ctx.id(), target = %target, ?provider, "play content");

        // An external input already playing exactly this target is a
        // no-op: no rebuild, no session churn.
        if self.external_input_already_playing(&target) {
            debug!(zone = %self.ctx.id(), "target already playing on external input, no-op");
            return;
        }

        // Fast path: seek within the existing queue.
        if self.ctx.state.mode != PlaybackMode::Stop && parsed.parent.is_none() {
            if let Some(position) = self.ctx.queue.position_of(&target) {
                if let Ok(item) = self.ctx.queue.seek_to(position).map(Clone::clone) {
                    info!(zone = %self.ctx.id(), index = position, "seek within existing queue");
                    self.start_queue_item(&item, None).await;
                    self.notify_queue();
                    return;
                }
            }
        }

        // Slow path: rebuild the queue from the provider.
        self.rebuild_queue(&uri, parsed, provider, opts).await;
    }

    fn external_input_already_playing(&self, target: &str) -> bool {
        let external = matches!(
            self.ctx.input_mode,
            Some(InputMode::Spotify) | Some(InputMode::MusicAssistant)
        );
        external
            && self.ctx.state.mode == PlaybackMode::Play
            && normalize_audiopath(&self.ctx.state.audiopath) == normalize_audiopath(target)
    }

    async fn rebuild_queue(
        &mut self,
        raw_uri: &str,
        parsed: ParsedPlayUri,
        provider: Provider,
        opts: PlayOptions,
    ) {
        let target = parsed.target.clone();
        let parent = parsed.parent.clone();
        let build_uri = parent
            .as_ref()
            .filter(|p| !p.parent_uri.is_empty())
            .map(|p| p.parent_uri.clone())
            .unwrap_or_else(|| target.clone());

        let request = QueueBuildRequest {
            uri: build_uri,
            zone_name: self.ctx.config.name.clone(),
            station: opts.station.clone(),
            raw_audiopath: Some(raw_uri.to_string()),
            limit: Some(SYNC_BUILD_LIMIT),
        };

        let mut items = match self.repo.content.build_queue_for_uri(&request).await {
            Ok(items) => items,
            Err(e) => {
                warn!(zone = %self.ctx.id(), error = %e, "queue build failed");
                let error = PlaybackError::new(
                    self.ctx.id(),
                    PlaybackErrorKind::StreamUnavailable {
                        provider: provider.prefix().to_string(),
                    },
                    ErrorSource::Player,
                )
                .with_provider(provider.prefix().to_string());
                self.handle_playback_error(error).await;
                return;
            }
        };

        if items.is_empty() {
            // Single-item fallback from the request itself.
            let mut item = QueueItem::from_audiopath(target.clone());
            if let Some(metadata) = &opts.metadata {
                item.title = metadata.title.clone();
                item.duration = metadata.duration.unwrap_or(0);
                item.station = metadata.station.clone();
                item.cover = metadata.cover.clone();
            }
            items.push(item);
        }

        let authority = self.resolve_queue_authority(&items);
        let start_index = parent
            .as_ref()
            .and_then(|p| p.start_index)
            .or_else(|| {
                items.iter().position(|item| {
                    item.unique_id == target
                        || normalize_audiopath(&item.audiopath) == normalize_audiopath(&target)
                })
            })
            .unwrap_or(0);

        let synchronous_len = items.len();
        self.ctx
            .queue
            .set_items(items, start_index, authority.clone());
        self.ctx.state.authority = authority;

        // Apply a pending shuffle unless the request forbids it.
        let no_shuffle = parent.as_ref().map(|p| p.no_shuffle).unwrap_or(false);
        if (self.ctx.pending_shuffle || self.ctx.state.shuffle) && !no_shuffle {
            self.ctx.queue.set_shuffle(false); // align internal flag
            self.ctx.queue.set_shuffle(true);
            self.ctx.state.shuffle = true;
            self.ctx.pending_shuffle = false;
        }

        // Large source: continue filling in background, bounded by a
        // monotonic token so a later rebuild invalidates the fill.
        if synchronous_len >= SYNC_BUILD_LIMIT {
            self.spawn_background_fill(&request, synchronous_len);
        }

        // Radio classification: radio providers, or a bare HTTP URL with
        // no positive duration in the incoming metadata.
        let metadata = opts.metadata.clone().unwrap_or_default();
        self.ctx.is_radio = provider.is_radio_provider()
            || (provider == Provider::HttpUrl && !metadata.has_positive_duration());

        let Some(item) = self.ctx.queue.current_item().cloned() else {
            self.stop_with_reason(StopReason::QueueInvalidNext).await;
            return;
        };
        self.start_queue_item(&item, opts.metadata.as_ref()).await;
        self.notify_queue();
    }

    fn spawn_background_fill(&mut self, request: &QueueBuildRequest, already: usize) {
        let token = self.ctx.queue.next_fill_token();
        let content = self.repo.content.clone();
        let tx = self.self_tx.clone();
        let mut full_request = request.clone();
        full_request.limit = None;

        tokio::spawn(async move {
            match content.build_queue_for_uri(&full_request).await {
                Ok(full) if full.len() > already => {
                    let rest: Vec<QueueItem> = full.into_iter().skip(already).collect();
                    let _ = tx.send(ZoneMsg::QueueFill { token, items: rest }).await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "background queue fill failed"),
            }
        });
    }

    fn resolve_queue_authority(&self, items: &[QueueItem]) -> QueueAuthority {
        let Some(first) = items.first() else {
            return QueueAuthority::Local;
        };
        let provider = Provider::classify(&first.audiopath);
        match provider.remote_queue_tag() {
            // Spotify with offload disabled downgrades to local: the core
            // drives queue advancement while the remote renders.
            Some("spotify") if !self.repo.spotify_offload_enabled => QueueAuthority::Local,
            Some(tag) => QueueAuthority::Remote(tag.to_string()),
            None => QueueAuthority::Local,
        }
    }

    // ===== start playback =====

    async fn start_queue_item(&mut self, item: &QueueItem, extra: Option<&TrackMetadata>) {
        let mut metadata = TrackMetadata {
            title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
            cover: item.cover.clone(),
            duration: Some(item.duration),
            station: item.station.clone(),
        };
        if let Some(extra) = extra {
            metadata.merge(extra);
        }
        self.start_queue_playback(item.audiopath.clone(), metadata, None)
            .await;
    }

    /// Starts playback of `audiopath` on the zone's outputs.
    async fn start_queue_playback(
        &mut self,
        audiopath: String,
        metadata: TrackMetadata,
        seek_ms: Option<u64>,
    ) {
        let provider = Provider::classify(&audiopath);
        let wants_offload = matches!(provider, Provider::Spotify { .. })
            && self.repo.spotify_offload_enabled
            && self.ctx.offload_output().is_some();

        // Refuse when nothing can render and no offload path exists.
        let renderables = self.ctx.renderable_outputs();
        if renderables.is_empty() && !wants_offload {
            warn!(zone = %self.ctx.id(), "no output configured");
            let error = PlaybackError::new(
                self.ctx.id(),
                PlaybackErrorKind::NoOutputConfigured,
                ErrorSource::Output,
            );
            self.handle_playback_error(error).await;
            return;
        }

        // Preferred format from the primary output; radio and plain HTTP
        // local-queue sources get the small prebuffer.
        let mut preferred = self
            .ctx
            .primary_output()
            .and_then(|output| output.preferred_output())
            .unwrap_or_default();
        if self.ctx.is_radio
            || (provider == Provider::HttpUrl && self.ctx.queue.authority().is_local())
        {
            preferred = preferred.with_low_latency_prebuffer();
        }

        // Input transition: a differently-labelled external session stops
        // before the new one takes over; its stale callbacks are dropped
        // by the activeInput gate from here on.
        let (input_mode, input_label) = if wants_offload {
            (InputMode::Spotify, Some("spotify".to_string()))
        } else if matches!(provider, Provider::MusicAssistant { .. }) {
            (InputMode::MusicAssistant, Some("musicassistant".to_string()))
        } else {
            (InputMode::Queue, None)
        };
        self.transition_input(input_mode, input_label.clone()).await;

        let plan = PlaybackPlan {
            audiopath: audiopath.clone(),
            metadata: metadata.clone(),
            classification: if self.ctx.is_radio {
                AudioType::Radio
            } else {
                AudioType::Music
            },
            preferred,
            provider: provider.prefix().to_string(),
            input_label,
            seek_ms,
        };

        self.execute_plan(plan).await;
    }

    async fn transition_input(&mut self, mode: InputMode, label: Option<String>) {
        if let Some(active) = self.ctx.active_input.clone() {
            if Some(active.as_str()) != label.as_deref() {
                let reason = match &label {
                    None => StopReason::SwitchToQueue,
                    Some(new_label) => StopReason::SwitchToInput(new_label.clone()),
                };
                if let Err(e) = self
                    .repo
                    .inputs
                    .stop_session(self.ctx.id(), &active, &reason.token())
                    .await
                {
                    warn!(zone = %self.ctx.id(), input = %active, error = %e, "input session stop failed");
                }
            }
        }
        self.ctx.input_mode = Some(mode);
        self.ctx.active_input = label;
    }

    fn profiles_for_outputs(&self) -> Vec<StreamProfile> {
        let mut profiles = Vec::new();
        for output in &self.ctx.outputs {
            let profile = match output.type_name() {
                "airplay" | "slimproto" | "sendspin" => StreamProfile::Pcm,
                "snapcast" | "dlna" | "sonos" | "cast" => StreamProfile::Flac,
                _ => continue,
            };
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }
        if profiles.is_empty() {
            profiles.push(StreamProfile::Flac);
        }
        profiles
    }

    async fn execute_plan(&mut self, plan: PlaybackPlan) {
        // Resolve the playback source: input adapters answer for offload
        // paths, the content port for everything else.
        let source = if let Some(label) = &plan.input_label {
            match self
                .repo
                .inputs
                .resolve_input_source(self.ctx.id(), label, &plan.audiopath)
                .await
            {
                Ok(source) => source,
                Err(e) => {
                    warn!(zone = %self.ctx.id(), error = %e, "input source resolution failed");
                    None
                }
            }
        } else {
            let request = SourceRequest {
                audiopath: plan.audiopath.clone(),
                seek_ms: plan.seek_ms,
                account_id: None,
                preferred: plan.preferred,
            };
            match self.repo.content.resolve_playback_source(&request).await {
                Ok(resolved) => resolved.playback_source,
                Err(e) => {
                    warn!(zone = %self.ctx.id(), error = %e, "source resolution failed");
                    let error = PlaybackError::new(
                        self.ctx.id(),
                        PlaybackErrorKind::StreamUnavailable {
                            provider: plan.provider.clone(),
                        },
                        ErrorSource::Player,
                    )
                    .with_provider(plan.provider.clone());
                    self.handle_playback_error(error).await;
                    return;
                }
            }
        };

        let session = match source {
            Some(source) => {
                let options = StartOptions {
                    zone_id: self.ctx.id(),
                    source: source.clone(),
                    profiles: self.profiles_for_outputs(),
                    preferred: plan.preferred,
                    label: "queue".to_string(),
                    metadata: plan.metadata.clone(),
                };
                let handoff = HandoffOptions {
                    timeout_ms: self.repo.handoff_timeout_ms,
                };
                let mut started = self
                    .repo
                    .engine
                    .start_with_handoff(options.clone(), Some(handoff))
                    .await;

                // One retry for restartable radio/url sources.
                if started.is_err() && source.is_restartable() && plan.is_radio() {
                    debug!(zone = %self.ctx.id(), "retrying radio source start");
                    let retry_handoff = HandoffOptions {
                        timeout_ms: self.repo.handoff_timeout_ms,
                    };
                    started = self
                        .repo
                        .engine
                        .start_with_handoff(options, Some(retry_handoff))
                        .await;
                }

                match started {
                    Ok(session) => Some(session),
                    Err(e) => {
                        let error = PlaybackError::new(
                            self.ctx.id(),
                            PlaybackErrorKind::EngineStartFailed {
                                message: e.to_string(),
                            },
                            ErrorSource::Player,
                        )
                        .with_provider(plan.provider.clone());
                        self.handle_playback_error(error).await;
                        return;
                    }
                }
            }
            None if plan.input_label.is_some() => {
                // Offload: the external client renders on its own; there is
                // no engine session to create.
                None
            }
            None => {
                let error = PlaybackError::new(
                    self.ctx.id(),
                    PlaybackErrorKind::StreamUnavailable {
                        provider: plan.provider.clone(),
                    },
                    ErrorSource::Player,
                )
                .with_provider(plan.provider.clone());
                self.handle_playback_error(error).await;
                return;
            }
        };

        // Fan play out to the renderable outputs.
        if let Some(session) = &session {
            let renderables = self.ctx.renderable_outputs();
            let failures: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
            let succeeded = self
                .repo
                .router
                .dispatch_outputs(
                    self.ctx.id(),
                    &renderables,
                    OutputAction::Play,
                    Some(session),
                    &|_, output, reason| {
                        failures
                            .lock()
                            .unwrap()
                            .push((output.to_string(), reason));
                    },
                )
                .await;

            if succeeded == 0 && !renderables.is_empty() {
                let (output, reason) = failures
                    .into_inner()
                    .unwrap()
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| ("output".to_string(), "play failed".to_string()));
                let error = PlaybackError::new(
                    self.ctx.id(),
                    PlaybackErrorKind::OutputError {
                        output_type: output,
                        reason,
                    },
                    ErrorSource::Output,
                );
                self.handle_playback_error(error).await;
                return;
            }
        }

        // Observable state.
        self.ctx.session = session;
        self.ctx.state.mode = PlaybackMode::Play;
        self.ctx.state.audiopath = plan.audiopath.clone();
        self.ctx.state.metadata = plan.metadata.clone();
        if let Some(station) = plan.metadata.station.as_deref() {
            self.ctx.state.metadata.station = sanitize_station(station, &plan.audiopath);
        }
        if plan.is_radio() {
            self.ctx.state.metadata.duration = Some(0);
            self.ctx.state.time = 0;
        } else {
            self.ctx.state.time = plan.seek_ms.map(|ms| ms / 1000).unwrap_or(0);
        }
        self.ctx.state.audio_type = plan.classification;
        self.ctx.state.qindex = self.ctx.queue.current_index();
        self.ctx.state.qid = self
            .ctx
            .queue
            .current_item()
            .map(|item| item.unique_id.clone())
            .unwrap_or_default();
        self.ctx.state.power = PowerState::On;
        self.ctx.state.client_state = PowerState::On;

        if let Some(item) = self.ctx.queue.current_item().cloned() {
            let storage = self.repo.storage.clone();
            let zone_id = self.ctx.id();
            tokio::spawn(async move {
                let _ = storage.record_recent(zone_id, &item).await;
            });
        }

        info!(zone = %self.ctx.id(), audiopath = %plan.audiopath, "playback started");
        self.notify_state(true);
    }

    // ===== command surface =====

    async fn handle_command(&mut self, command: ZoneCommand) {
        match command {
            ZoneCommand::Play => match self.ctx.state.mode {
                PlaybackMode::Play => {}
                PlaybackMode::Pause => self.resume().await,
                PlaybackMode::Stop => {
                    // Resume-from-stop restarts the head of the current item.
                    if let Some(item) = self.ctx.queue.current_item().cloned() {
                        self.start_queue_item(&item, None).await;
                    }
                }
            },
            ZoneCommand::Pause => {
                if self.ctx.state.mode == PlaybackMode::Play {
                    self.pause().await;
                }
                // Pause from stop is a no-op.
            }
            ZoneCommand::Stop => self.stop_with_reason(StopReason::UserRequest).await,
            ZoneCommand::QueuePlus => self.step_queue(1).await,
            ZoneCommand::QueueMinus => self.step_queue(-1).await,
            ZoneCommand::Position(seconds) => self.seek(seconds).await,
            ZoneCommand::Volume { value, relative } => self.apply_volume(value, relative).await,
            ZoneCommand::Shuffle(arg) => self.apply_shuffle(arg),
            ZoneCommand::Repeat => {
                let repeat = self.ctx.queue.cycle_repeat();
                self.ctx.state.repeat = repeat;
                self.notify_state(true);
            }
        }
    }

    async fn pause(&mut self) {
        let outputs = self.ctx.renderable_outputs();
        self.repo
            .router
            .dispatch_outputs(
                self.ctx.id(),
                &outputs,
                OutputAction::Pause,
                self.ctx.session.as_ref(),
                &|_, _, _| {},
            )
            .await;
        if let Some(label) = self.ctx.active_input.clone() {
            let _ = self.repo.inputs.pause_session(self.ctx.id(), &label).await;
        }
        self.ctx.state.mode = PlaybackMode::Pause;
        self.notify_state(true);
    }

    async fn resume(&mut self) {
        let outputs = self.ctx.renderable_outputs();
        self.repo
            .router
            .dispatch_outputs(
                self.ctx.id(),
                &outputs,
                OutputAction::Resume,
                self.ctx.session.as_ref(),
                &|_, _, _| {},
            )
            .await;
        if let Some(label) = self.ctx.active_input.clone() {
            let _ = self.repo.inputs.resume_session(self.ctx.id(), &label).await;
        }
        self.ctx.state.mode = PlaybackMode::Play;
        self.notify_state(true);
    }

    async fn stop_with_reason(&mut self, reason: StopReason) {
        let outputs = self.ctx.renderable_outputs();
        self.repo
            .router
            .dispatch_outputs(
                self.ctx.id(),
                &outputs,
                OutputAction::Stop,
                self.ctx.session.as_ref(),
                &|_, _, _| {},
            )
            .await;
        self.repo
            .engine
            .stop(self.ctx.id(), Some(&reason.token()), true);

        if let Some(label) = self.ctx.active_input.clone() {
            let _ = self
                .repo
                .inputs
                .stop_session(self.ctx.id(), &label, &reason.token())
                .await;
            self.ctx.active_input = None;
        }

        self.ctx.input_mode = None;
        self.ctx.apply_stop(true);
        info!(zone = %self.ctx.id(), reason = %reason.token(), "zone stopped");
        self.notify_state(true);
    }

    async fn step_queue(&mut self, delta: i64) {
        // Outputs owning a remote queue claim the step; otherwise the
        // local queue advances.
        if self
            .repo
            .router
            .dispatch_queue_step(&self.ctx.outputs, delta)
            .await
        {
            debug!(zone = %self.ctx.id(), delta, "queue step owned by output");
            return;
        }

        match self.ctx.queue.step(delta) {
            Some(_) => {
                if let Some(item) = self.ctx.queue.current_item().cloned() {
                    self.start_queue_item(&item, None).await;
                    self.notify_queue();
                }
            }
            None => self.stop_with_reason(StopReason::QueueEnd).await,
        }
    }

    async fn seek(&mut self, seconds: u64) {
        if self.ctx.is_radio {
            // Radio has no seekable timeline.
            return;
        }
        match self.ctx.queue.authority().clone() {
            QueueAuthority::Remote(tag) => {
                let label = self.ctx.active_input.clone().unwrap_or(tag);
                let _ = self
                    .repo
                    .inputs
                    .forward_command(self.ctx.id(), &label, "seek", Some(seconds as i64))
                    .await;
            }
            QueueAuthority::Local => {
                if let Some(item) = self.ctx.queue.current_item().cloned() {
                    let metadata = self.ctx.state.metadata.clone();
                    self.start_queue_playback(item.audiopath, metadata, Some(seconds * 1000))
                        .await;
                }
            }
        }
    }

    async fn apply_volume(&mut self, value: i64, relative: bool) {
        let policy = self.ctx.config.volume_policy;
        let target = if relative {
            self.ctx.state.volume as i64 + value * policy.step as i64
        } else {
            value
        };

        let applied = self
            .repo
            .router
            .dispatch_volume(self.ctx.id(), &self.ctx.outputs, &policy, target, &|_, _, _| {})
            .await;
        self.ctx.state.volume = applied;

        if let Some(label) = self.ctx.active_input.clone() {
            let _ = self
                .repo
                .inputs
                .forward_command(self.ctx.id(), &label, "volume", Some(applied as i64))
                .await;
        }
        self.notify_state(true);
    }

    fn apply_shuffle(&mut self, arg: ShuffleArg) {
        let enabled = match arg {
            ShuffleArg::On => true,
            ShuffleArg::Off => false,
            ShuffleArg::Toggle => !self.ctx.state.shuffle,
        };

        if self.ctx.queue.is_empty() {
            self.ctx.pending_shuffle = enabled;
        } else {
            self.ctx.queue.set_shuffle(enabled);
        }
        self.ctx.state.shuffle = enabled;
        self.notify_state(true);
        self.notify_queue();
    }

    // ===== input callbacks =====

    async fn handle_input(&mut self, event: InputEvent) {
        // The activeInput gate: events from a non-active adapter are
        // dropped without any state mutation.
        if !self.ctx.input_matches(event.label()) {
            debug!(
                zone = %self.ctx.id(),
                from = event.label(),
                active = ?self.ctx.active_input,
                "input event dropped (not active input)"
            );
            return;
        }

        match event {
            InputEvent::Metadata { update, .. } => {
                self.ctx.merge_metadata(&update);
                if self.ctx.metadata_gate.allow() {
                    self.notify_state(false);
                }
            }
            InputEvent::Timing {
                elapsed, duration, ..
            } => {
                if self.ctx.is_radio {
                    self.ctx.state.time = 0;
                    self.ctx.state.metadata.duration = Some(0);
                } else {
                    self.ctx.state.time = elapsed;
                    self.ctx.state.metadata.duration = Some(duration);
                }
                if self.ctx.position_gate.allow() {
                    self.notify_state(false);
                }
            }
            InputEvent::Volume { volume, .. } => {
                self.ctx.state.volume = self.ctx.config.volume_policy.clamp(volume as i64);
                self.notify_state(true);
            }
            InputEvent::Cover { payload, .. } => {
                match self.repo.covers.ingest(&payload).await {
                    Ok(handle) => {
                        self.ctx.state.metadata.cover = Some(handle.url);
                        if self.ctx.metadata_gate.allow() {
                            self.notify_state(false);
                        }
                    }
                    Err(e) => warn!(zone = %self.ctx.id(), error = %e, "cover ingestion failed"),
                }
            }
            InputEvent::EndOfTrack { .. } => {
                if self.ctx.queue.authority().is_local() {
                    // Local authority: reinterpret as queue advance.
                    self.advance_queue().await;
                } else {
                    // Remote authority: echo only, never advance locally.
                    self.notify_state(false);
                }
            }
        }
    }

    // ===== queue progression =====

    async fn advance_queue(&mut self) {
        match self.ctx.queue.advance_after_end() {
            AdvanceOutcome::Next(_) => {
                let Some(item) = self.ctx.queue.current_item().cloned() else {
                    self.stop_with_reason(StopReason::QueueInvalidNext).await;
                    return;
                };
                let before = self.ctx.state.mode;
                self.start_queue_item(&item, None).await;
                // start_queue_item reports its own failure; detect it by
                // the mode falling back to stop.
                if before == PlaybackMode::Play && self.ctx.state.mode == PlaybackMode::Stop {
                    self.stop_with_reason(StopReason::QueueNextFailed).await;
                } else {
                    self.notify_queue();
                }
            }
            AdvanceOutcome::End => self.stop_with_reason(StopReason::QueueEnd).await,
            AdvanceOutcome::InvalidNext => {
                self.stop_with_reason(StopReason::QueueInvalidNext).await
            }
        }
    }

    async fn handle_engine_ended(&mut self, label: String) {
        match label.as_str() {
            "alert" => self.restore_after_alert().await,
            "queue" => {
                if self.ctx.state.mode == PlaybackMode::Play
                    && self.ctx.queue.authority().is_local()
                {
                    self.advance_queue().await;
                }
            }
            _ => {
                // An external input's pipe drained: the receiver went away.
                if self.ctx.state.mode != PlaybackMode::Stop {
                    self.stop_with_reason(StopReason::UserRequest).await;
                }
            }
        }
    }

    async fn handle_engine_failed(&mut self, label: String, message: String) {
        warn!(zone = %self.ctx.id(), label = %label, message = %message, "engine reported failure");
        let error = PlaybackError::new(
            self.ctx.id(),
            PlaybackErrorKind::EngineStartFailed { message },
            ErrorSource::Player,
        );
        self.handle_playback_error(error).await;
    }

    // ===== output echoes and snapshots =====

    fn handle_output_state(&mut self, event: mramodel::OutputStateEvent) {
        if let Some(position) = event.position {
            if self.ctx.is_radio {
                self.ctx.state.time = 0;
            } else {
                self.ctx.state.time = position;
            }
        }
        if let Some(duration) = event.duration {
            if !self.ctx.is_radio {
                self.ctx.state.metadata.duration = Some(duration);
            }
        }
        if self.ctx.position_gate.allow() {
            self.notify_state(false);
        }
    }

    fn handle_queue_snapshot(&mut self, items: Vec<QueueItem>, current_index: usize) {
        match self.ctx.queue.update_from_output(items, current_index) {
            SnapshotOutcome::Applied | SnapshotOutcome::Merged => {
                self.ctx.state.qindex = self.ctx.queue.current_index();
                self.ctx.state.qid = self
                    .ctx
                    .queue
                    .current_item()
                    .map(|item| item.unique_id.clone())
                    .unwrap_or_default();
                self.notify_queue();
            }
            SnapshotOutcome::Duplicate | SnapshotOutcome::IgnoredEmpty => {}
        }
    }

    fn handle_queue_fill(&mut self, token: u64, items: Vec<QueueItem>) {
        match self.ctx.queue.append_fill(token, items) {
            Ok(appended) if appended > 0 => self.notify_queue(),
            Ok(_) => {}
            Err(e) => debug!(zone = %self.ctx.id(), error = %e, "stale queue fill discarded"),
        }
    }

    // ===== errors =====

    async fn handle_playback_error(&mut self, error: PlaybackError) {
        let reason = match &error.kind {
            PlaybackErrorKind::NoOutputConfigured => StopReason::NoOutputConfigured,
            PlaybackErrorKind::EngineStartFailed { .. } => StopReason::EngineFailed,
            PlaybackErrorKind::StreamUnavailable { .. } => StopReason::StreamUnavailable,
            PlaybackErrorKind::OutputError { .. } => StopReason::EngineFailed,
            PlaybackErrorKind::GroupBroadcastFailed { .. } => StopReason::EngineFailed,
        };
        warn!(zone = %self.ctx.id(), reason = %reason.token(), source = ?error.source, "playback error");

        let outputs = self.ctx.renderable_outputs();
        self.repo
            .router
            .dispatch_outputs(
                self.ctx.id(),
                &outputs,
                OutputAction::Stop,
                self.ctx.session.as_ref(),
                &|_, _, _| {},
            )
            .await;
        self.repo
            .engine
            .stop(self.ctx.id(), Some(&reason.token()), true);

        self.ctx.input_mode = None;
        self.ctx.active_input = None;
        self.ctx.apply_stop(error.provider_stays_reachable());

        self.repo.notifier.notify(NotifierEvent::PlaybackFailed {
            zone_id: self.ctx.id(),
            reason: reason.token(),
        });
        self.notify_state(true);
    }

    // ===== external input sessions =====

    /// An external receiver (AirPlay, Spotify Connect, line-in, Music
    /// Assistant) starts delivering audio for this zone.
    async fn handle_start_input(
        &mut self,
        label: String,
        source: mramodel::PlaybackSource,
        metadata: TrackMetadata,
    ) {
        let Some(mode) = InputMode::from_label(&label) else {
            warn!(zone = %self.ctx.id(), label = %label, "unknown input label");
            return;
        };

        self.transition_input(mode, Some(label.clone())).await;

        let options = StartOptions {
            zone_id: self.ctx.id(),
            source,
            profiles: self.profiles_for_outputs(),
            preferred: self
                .ctx
                .primary_output()
                .and_then(|output| output.preferred_output())
                .unwrap_or_default()
                .with_low_latency_prebuffer(),
            label: label.clone(),
            metadata: metadata.clone(),
        };
        let handoff = HandoffOptions {
            timeout_ms: self.repo.handoff_timeout_ms,
        };
        match self.repo.engine.start_with_handoff(options, Some(handoff)).await {
            Ok(session) => {
                let outputs = self.ctx.renderable_outputs();
                self.repo
                    .router
                    .dispatch_outputs(
                        self.ctx.id(),
                        &outputs,
                        OutputAction::Play,
                        Some(&session),
                        &|_, _, _| {},
                    )
                    .await;
                self.ctx.session = Some(session);
                self.ctx.state.mode = PlaybackMode::Play;
                self.ctx.state.metadata = metadata;
                self.ctx.state.audiopath = format!("{label}:input");
                self.ctx.state.audio_type = if mode == InputMode::LineIn {
                    AudioType::LineIn
                } else {
                    AudioType::Music
                };
                self.ctx.state.power = PowerState::On;
                self.ctx.state.client_state = PowerState::On;
                self.ctx.is_radio = false;
                info!(zone = %self.ctx.id(), input = %label, "external input playing");
                self.notify_state(true);
            }
            Err(e) => {
                warn!(zone = %self.ctx.id(), input = %label, error = %e, "input session start failed");
                let error = PlaybackError::new(
                    self.ctx.id(),
                    PlaybackErrorKind::EngineStartFailed {
                        message: e.to_string(),
                    },
                    ErrorSource::Player,
                )
                .with_provider(label);
                self.handle_playback_error(error).await;
            }
        }
    }

    // ===== alerts =====

    async fn handle_play_alert(&mut self, audiopath: String, volume: u32) {
        self.ctx.snapshot_for_alert();
        self.ctx.input_mode = Some(InputMode::Alert);

        let request = SourceRequest {
            audiopath: audiopath.clone(),
            seek_ms: None,
            account_id: None,
            preferred: Default::default(),
        };
        let source = match self.repo.content.resolve_playback_source(&request).await {
            Ok(resolved) => resolved.playback_source,
            Err(e) => {
                warn!(zone = %self.ctx.id(), error = %e, "alert source resolution failed");
                None
            }
        };
        let Some(source) = source else {
            self.ctx.alert = None;
            self.ctx.input_mode = None;
            return;
        };

        let options = StartOptions {
            zone_id: self.ctx.id(),
            source,
            profiles: self.profiles_for_outputs(),
            preferred: Default::default(),
            label: "alert".to_string(),
            metadata: TrackMetadata {
                title: Some("Alert".to_string()),
                ..Default::default()
            },
        };
        let handoff = HandoffOptions {
            timeout_ms: self.repo.handoff_timeout_ms,
        };
        match self.repo.engine.start_with_handoff(options, Some(handoff)).await {
            Ok(session) => {
                let outputs = self.ctx.renderable_outputs();
                let policy = self.ctx.config.volume_policy;
                self.repo
                    .router
                    .dispatch_volume(self.ctx.id(), &outputs, &policy, volume as i64, &|_, _, _| {})
                    .await;
                self.repo
                    .router
                    .dispatch_outputs(
                        self.ctx.id(),
                        &outputs,
                        OutputAction::Play,
                        Some(&session),
                        &|_, _, _| {},
                    )
                    .await;
                self.ctx.session = Some(session);
                self.ctx.state.audio_type = mramodel::AudioType::Alert;
                info!(zone = %self.ctx.id(), audiopath = %audiopath, "alert playing");
            }
            Err(e) => {
                warn!(zone = %self.ctx.id(), error = %e, "alert start failed");
                self.ctx.alert = None;
                self.ctx.input_mode = None;
            }
        }
    }

    async fn restore_after_alert(&mut self) {
        let Some(snapshot) = self.ctx.alert.take() else {
            return;
        };
        info!(zone = %self.ctx.id(), "alert finished, restoring state");

        self.ctx.input_mode = snapshot.input_mode;
        let was_playing = snapshot.state.mode == PlaybackMode::Play;
        let queue_index = snapshot.queue_index;
        self.ctx.state = snapshot.state;

        // Restore the pre-alert volume on the outputs.
        let outputs = self.ctx.renderable_outputs();
        let policy = self.ctx.config.volume_policy;
        self.repo
            .router
            .dispatch_volume(
                self.ctx.id(),
                &outputs,
                &policy,
                self.ctx.state.volume as i64,
                &|_, _, _| {},
            )
            .await;

        if was_playing {
            if self.ctx.queue.seek_to(queue_index).is_ok() {
                if let Some(item) = self.ctx.queue.current_item().cloned() {
                    self.start_queue_item(&item, None).await;
                    return;
                }
            }
        }
        self.ctx.state.mode = PlaybackMode::Stop;
        self.notify_state(true);
    }
}
