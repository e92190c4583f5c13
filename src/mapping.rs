//! MIDI learn and CC mapping
//!
//! Binds hardware controllers `(channel, cc)` to layer or LFO parameters.
//! A single learn slot can be armed; the next Control Change completes the
//! bind. Outside learn mode every CC is applied to all mappings sharing its
//! source.

mod apply;

use anyhow::bail;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::midi::{MidiEvent, MidiEventKind};
use crate::store::ParameterStore;

pub use apply::{apply_value, PARTICLE_COUNT_MAX, PARTICLE_COUNT_MIN};

/// Kind of entity a mapping writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Layer,
    Lfo,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Layer => "layer",
            TargetKind::Lfo => "lfo",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "layer" => Ok(TargetKind::Layer),
            "lfo" => Ok(TargetKind::Lfo),
            other => bail!("Unknown mapping target type: {}", other),
        }
    }
}

/// Hardware control a mapping listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingSource {
    /// Channel (0-15)
    pub channel: u8,
    pub cc: u8,
}

/// Parameter a mapping writes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingTarget {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub target_id: String,
    /// e.g. "opacity", "params.count", "rate"
    pub param_path: String,
}

impl MappingTarget {
    pub fn new(kind: TargetKind, target_id: impl Into<String>, param_path: impl Into<String>) -> Self {
        Self {
            kind,
            target_id: target_id.into(),
            param_path: param_path.into(),
        }
    }

    /// Same entity and parameter (kind is not part of the identity)
    pub fn same_slot(&self, other: &MappingTarget) -> bool {
        self.target_id == other.target_id && self.param_path == other.param_path
    }
}

impl fmt::Display for MappingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.kind, self.target_id, self.param_path)
    }
}

/// A controller-to-parameter binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiMapping {
    pub id: String,
    pub source: MappingSource,
    pub target: MappingTarget,
}

/// The single pending-bind register
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearningState {
    pub is_active: bool,
    pub target_type: Option<TargetKind>,
    pub target_id: Option<String>,
    pub param_path: Option<String>,
}

impl LearningState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Armed state; stays inactive when the id or path is empty
    pub fn armed(kind: TargetKind, target_id: &str, param_path: &str) -> Self {
        Self {
            is_active: !target_id.is_empty() && !param_path.is_empty(),
            target_type: Some(kind),
            target_id: Some(target_id.to_string()),
            param_path: Some(param_path.to_string()),
        }
    }

    /// Target to bind, when learning is active and fully specified
    pub fn target(&self) -> Option<MappingTarget> {
        if !self.is_active {
            return None;
        }
        match (&self.target_type, &self.target_id, &self.param_path) {
            (Some(kind), Some(id), Some(path)) if !id.is_empty() && !path.is_empty() => {
                Some(MappingTarget::new(*kind, id.clone(), path.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct MappingTable {
    mappings: Vec<MidiMapping>,
    learning: LearningState,
    next_id: u64,
}

impl MappingTable {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("map-{}", self.next_id)
    }

    /// Insert, removing any mapping on the same target slot. Learning is
    /// reset as part of the same update.
    fn insert(&mut self, mapping: MidiMapping) -> Vec<MidiMapping> {
        let (superseded, kept): (Vec<_>, Vec<_>) = self
            .mappings
            .drain(..)
            .partition(|m| m.target.same_slot(&mapping.target));
        self.mappings = kept;
        self.mappings.push(mapping);
        self.learning = LearningState::idle();
        superseded
    }
}

/// Learn-mode state machine plus the mapping table.
///
/// Mappings and learning state share one lock so a bind (insert, supersede,
/// leave learn mode) is a single update.
#[derive(Clone)]
pub struct MappingEngine {
    table: Arc<Mutex<MappingTable>>,
    store: Arc<dyn ParameterStore>,
}

impl MappingEngine {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self {
            table: Arc::new(Mutex::new(MappingTable::default())),
            store,
        }
    }

    /// Handle one decoded event. Only Control Change is mappable.
    pub fn process_control_change(&self, event: &MidiEvent) {
        if event.kind != MidiEventKind::ControlChange {
            return;
        }

        let mut table = self.table.lock();

        if let Some(target) = table.learning.target() {
            let source = MappingSource {
                channel: event.channel,
                cc: event.data1,
            };
            let id = table.next_id();
            info!(
                "🎛️  Learned ch:{} cc:{} → {} ({})",
                source.channel + 1,
                source.cc,
                target,
                id
            );
            let superseded = table.insert(MidiMapping { id, source, target });
            for old in superseded {
                debug!("Superseded mapping {} (ch:{} cc:{})", old.id, old.source.channel + 1, old.source.cc);
            }
            return;
        }

        let value = event.normalized();
        for mapping in table
            .mappings
            .iter()
            .filter(|m| m.source.channel == event.channel && m.source.cc == event.data1)
        {
            if !apply_value(self.store.as_ref(), &mapping.target, value) {
                trace!("Mapping {} skipped ({})", mapping.id, mapping.target);
            }
        }
    }

    /// Arm learn mode for a target, replacing any armed target
    pub fn arm_learning(&self, kind: TargetKind, target_id: &str, param_path: &str) -> LearningState {
        let state = LearningState::armed(kind, target_id, param_path);
        if state.is_active {
            info!("MIDI learn armed for {}:{}.{}", kind, target_id, param_path);
        }
        self.table.lock().learning = state.clone();
        state
    }

    pub fn cancel_learning(&self) {
        let mut table = self.table.lock();
        if table.learning.is_active {
            debug!("MIDI learn cancelled");
        }
        table.learning = LearningState::idle();
    }

    pub fn learning_state(&self) -> LearningState {
        self.table.lock().learning.clone()
    }

    /// Insert a mapping directly, superseding any mapping on the same slot.
    /// An empty id is replaced by a generated one. Also leaves learn mode.
    pub fn add_mapping(&self, mut mapping: MidiMapping) -> MidiMapping {
        let mut table = self.table.lock();
        if mapping.id.is_empty() {
            mapping.id = table.next_id();
        }
        table.insert(mapping.clone());
        mapping
    }

    pub fn remove_mapping(&self, id: &str) -> bool {
        let mut table = self.table.lock();
        let before = table.mappings.len();
        table.mappings.retain(|m| m.id != id);
        table.mappings.len() != before
    }

    /// Copy of the current mapping list
    pub fn mappings(&self) -> Vec<MidiMapping> {
        self.table.lock().mappings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn cc(channel: u8, controller: u8, value: u8) -> MidiEvent {
        MidiEvent::decode(&[0xB0 | channel, controller, value], "test", 0.0).unwrap()
    }

    fn engine() -> (Arc<InMemoryStore>, MappingEngine) {
        let store = Arc::new(InMemoryStore::with_defaults());
        let engine = MappingEngine::new(store.clone());
        (store, engine)
    }

    #[test]
    fn test_learn_binds_next_cc_without_applying() {
        let (store, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");

        engine.process_control_change(&cc(2, 21, 0));

        let mappings = engine.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].source, MappingSource { channel: 2, cc: 21 });
        assert_eq!(mappings[0].target.param_path, "opacity");
        assert!(!engine.learning_state().is_active);
        // the binding event itself carries no value
        assert_eq!(store.layer("layer-1").unwrap().opacity, 1.0);

        engine.process_control_change(&cc(2, 21, 0));
        assert_eq!(store.layer("layer-1").unwrap().opacity, 0.0);
    }

    #[test]
    fn test_non_cc_events_are_ignored() {
        let (_, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");

        let note = MidiEvent::decode(&[0x90, 60, 100], "test", 0.0).unwrap();
        let bend = MidiEvent::decode(&[0xE0, 0, 64], "test", 0.0).unwrap();
        engine.process_control_change(&note);
        engine.process_control_change(&bend);

        assert!(engine.mappings().is_empty());
        assert!(engine.learning_state().is_active);
    }

    #[test]
    fn test_rebinding_same_target_supersedes() {
        let (_, engine) = engine();
        engine.arm_learning(TargetKind::Lfo, "lfo-1", "rate");
        engine.process_control_change(&cc(0, 10, 64));
        engine.arm_learning(TargetKind::Lfo, "lfo-1", "rate");
        engine.process_control_change(&cc(0, 11, 64));

        let mappings = engine.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].source.cc, 11);
    }

    #[test]
    fn test_one_source_drives_many_targets() {
        let (store, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");
        engine.process_control_change(&cc(0, 1, 0));
        engine.arm_learning(TargetKind::Lfo, "lfo-2", "depth");
        engine.process_control_change(&cc(0, 1, 0));

        engine.process_control_change(&cc(0, 1, 127));
        assert_eq!(store.layer("layer-1").unwrap().opacity, 1.0);
        assert_eq!(store.lfo("lfo-2").unwrap().depth, 1.0);

        // same cc on another channel does not match
        engine.process_control_change(&cc(1, 1, 0));
        assert_eq!(store.lfo("lfo-2").unwrap().depth, 1.0);
    }

    #[test]
    fn test_arming_replaces_previous_target() {
        let (_, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");
        engine.arm_learning(TargetKind::Lfo, "lfo-1", "depth");
        engine.process_control_change(&cc(0, 7, 0));

        let mappings = engine.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].target, MappingTarget::new(TargetKind::Lfo, "lfo-1", "depth"));
    }

    #[test]
    fn test_incomplete_learn_target_stays_inactive() {
        let (_, engine) = engine();
        let state = engine.arm_learning(TargetKind::Layer, "layer-1", "");
        assert!(!state.is_active);
        engine.process_control_change(&cc(0, 7, 64));
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_cancel_learning() {
        let (_, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");
        engine.cancel_learning();
        assert_eq!(engine.learning_state(), LearningState::idle());
        engine.process_control_change(&cc(0, 7, 64));
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_dangling_target_is_skipped_and_kept() {
        let (store, engine) = engine();
        engine.arm_learning(TargetKind::Layer, "layer-1", "opacity");
        engine.process_control_change(&cc(0, 7, 0));

        store.remove_layer("layer-1");
        engine.process_control_change(&cc(0, 7, 100));
        assert_eq!(engine.mappings().len(), 1);
    }

    #[test]
    fn test_add_and_remove_mapping() {
        let (_, engine) = engine();
        let added = engine.add_mapping(MidiMapping {
            id: String::new(),
            source: MappingSource { channel: 0, cc: 74 },
            target: MappingTarget::new(TargetKind::Layer, "layer-1", "reactivity"),
        });
        assert_eq!(added.id, "map-1");

        let replacement = engine.add_mapping(MidiMapping {
            id: "custom".to_string(),
            source: MappingSource { channel: 3, cc: 74 },
            target: MappingTarget::new(TargetKind::Layer, "layer-1", "reactivity"),
        });
        let mappings = engine.mappings();
        assert_eq!(mappings, vec![replacement]);

        assert!(engine.remove_mapping("custom"));
        assert!(!engine.remove_mapping("custom"));
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_target_kind_parsing() {
        assert_eq!("LFO".parse::<TargetKind>().unwrap(), TargetKind::Lfo);
        assert!("envelope".parse::<TargetKind>().is_err());
    }
}
