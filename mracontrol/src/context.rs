//! Per-zone state: the unit the coordinator serializes.

use std::sync::Arc;

use mramodel::{
    InputMode, PlaybackMode, PlaybackSession, PowerState, TrackMetadata, VolumePolicy, ZoneId,
    ZoneState,
};
use mraoutputs::ZoneOutput;
use mraqueue::ZoneQueue;

use crate::throttle::RateGate;

/// Immutable per-zone configuration snapshot.
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub name: String,
    pub source_mac: String,
    pub volume_policy: VolumePolicy,
    /// Input labels enabled for the zone.
    pub enabled_inputs: Vec<String>,
}

/// Saved state across an interrupting alert sound.
#[derive(Clone, Debug)]
pub struct AlertSnapshot {
    pub state: ZoneState,
    pub input_mode: Option<InputMode>,
    pub queue_index: usize,
}

/// All mutable state of one zone.
///
/// Only the zone's single-writer loop touches this; nothing here is
/// shared behind a lock.
pub struct ZoneContext {
    pub config: ZoneConfig,
    pub state: ZoneState,
    pub queue: ZoneQueue,
    /// Ordered output drivers bound to the zone.
    pub outputs: Vec<Arc<dyn ZoneOutput>>,
    /// Type name of the primary output, when one is designated.
    pub active_output: Option<String>,
    pub input_mode: Option<InputMode>,
    /// Label of the input session allowed to mutate state.
    pub active_input: Option<String>,
    pub session: Option<PlaybackSession>,
    /// Radio classification of the current playback.
    pub is_radio: bool,
    /// Shuffle requested before the queue existed; applied on next build.
    pub pending_shuffle: bool,
    pub alert: Option<AlertSnapshot>,
    // Debounce gates (read/written only inside the zone serializer).
    pub(crate) zone_broadcast_gate: RateGate,
    pub(crate) position_gate: RateGate,
    pub(crate) metadata_gate: RateGate,
}

impl ZoneContext {
    pub fn new(config: ZoneConfig, outputs: Vec<Arc<dyn ZoneOutput>>) -> Self {
        let mut state = ZoneState::default();
        state.volume = config.volume_policy.default;
        let active_output = outputs.first().map(|o| o.type_name().to_string());

        Self {
            config,
            state,
            queue: ZoneQueue::new(),
            outputs,
            active_output,
            input_mode: None,
            active_input: None,
            session: None,
            is_radio: false,
            pending_shuffle: false,
            alert: None,
            zone_broadcast_gate: RateGate::per_second(),
            position_gate: RateGate::per_second(),
            metadata_gate: RateGate::per_second(),
        }
    }

    pub fn id(&self) -> ZoneId {
        self.config.id
    }

    /// True when the given adapter label is the active input.
    ///
    /// Input callbacks are dropped when this does not hold, preventing a
    /// just-dethroned receiver from poisoning state.
    pub fn input_matches(&self, label: &str) -> bool {
        self.active_input.as_deref() == Some(label)
    }

    /// Outputs able to render audio (excludes controller-style outputs).
    pub fn renderable_outputs(&self) -> Vec<Arc<dyn ZoneOutput>> {
        mraoutputs::OutputRouter::select_play_outputs(&self.outputs)
    }

    /// The output whose preferences drive the pipeline format.
    pub fn primary_output(&self) -> Option<Arc<dyn ZoneOutput>> {
        if let Some(kind) = &self.active_output {
            if let Some(output) = self
                .outputs
                .iter()
                .find(|o| o.type_name() == kind.as_str())
            {
                return Some(output.clone());
            }
        }
        self.renderable_outputs().into_iter().next()
    }

    /// Offload controller output for Spotify, when configured.
    pub fn offload_output(&self) -> Option<Arc<dyn ZoneOutput>> {
        self.outputs
            .iter()
            .find(|o| !o.is_renderable() && o.type_name() == "spotify")
            .cloned()
    }

    /// Applies a stop outcome to the observable state.
    ///
    /// `stays_reachable` keeps power/client state on for providers that
    /// remain addressable after a failure.
    pub fn apply_stop(&mut self, stays_reachable: bool) {
        self.state.mode = PlaybackMode::Stop;
        self.state.time = 0;
        self.session = None;
        if !stays_reachable {
            self.state.power = PowerState::Off;
            self.state.client_state = PowerState::Off;
        }
    }

    /// Saves the current state for restoration after an alert.
    pub fn snapshot_for_alert(&mut self) {
        self.alert = Some(AlertSnapshot {
            state: self.state.clone(),
            input_mode: self.input_mode,
            queue_index: self.queue.current_index(),
        });
    }

    /// Merges a metadata update into the state.
    pub fn merge_metadata(&mut self, update: &TrackMetadata) {
        self.state.metadata.merge(update);
    }
}
