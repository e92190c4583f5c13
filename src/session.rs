//! Session wiring
//!
//! Builds the pipeline once per run and hands out the shared handles.
//! There is no global state: everything that needs a component gets it
//! from here.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::audio::{AudioSource, SharedAudio};
use crate::config::AppConfig;
use crate::intensity::{InputMode, Intensity, IntensityAggregator};
use crate::mapping::MappingEngine;
use crate::midi::{MidiDecoder, NoteTracker};
use crate::modulation::Lfo;
use crate::store::InMemoryStore;

/// What one frame of the pipeline produced
#[derive(Debug, Clone, Serialize)]
pub struct FrameReadout {
    /// Seconds since session start
    pub time: f64,
    pub intensity: Intensity,
    /// `(lfo id, value)` for every LFO in the store
    pub lfos: Vec<(String, f64)>,
    pub held_notes: usize,
}

pub struct Session {
    store: Arc<InMemoryStore>,
    notes: NoteTracker,
    mapper: MappingEngine,
    decoder: Arc<MidiDecoder>,
    audio: SharedAudio,
    aggregator: IntensityAggregator,
    reactivity: RwLock<f64>,
    started: Instant,
}

impl Session {
    pub fn new(store: InMemoryStore, mode: InputMode) -> Self {
        let store = Arc::new(store);
        let notes = NoteTracker::new();
        let mapper = MappingEngine::new(store.clone());
        let decoder = Arc::new(MidiDecoder::new(notes.clone(), mapper.clone()));
        let audio = SharedAudio::new();
        let source: Arc<dyn AudioSource> = Arc::new(audio.clone());
        let aggregator = IntensityAggregator::new(notes.clone(), Some(source), mode);

        Self {
            store,
            notes,
            mapper,
            decoder,
            audio,
            aggregator,
            reactivity: RwLock::new(1.0),
            started: Instant::now(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let session = Self::new(config.build_store(), config.input.mode);
        session.set_reactivity(config.input.reactivity);
        session
    }

    /// Apply the live-tunable parts of a reloaded config.
    ///
    /// The store is not reseeded, so edits made while running survive.
    pub fn apply_config(&self, config: &AppConfig) {
        if self.aggregator.mode() != config.input.mode {
            info!("Input mode: {} → {}", self.aggregator.mode(), config.input.mode);
            self.aggregator.set_mode(config.input.mode);
        }
        self.set_reactivity(config.input.reactivity);
    }

    /// Global reactivity used by the frame loop and the REPL
    pub fn reactivity(&self) -> f64 {
        *self.reactivity.read()
    }

    pub fn set_reactivity(&self, reactivity: f64) {
        *self.reactivity.write() = reactivity.max(0.0);
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn notes(&self) -> &NoteTracker {
        &self.notes
    }

    pub fn mapper(&self) -> &MappingEngine {
        &self.mapper
    }

    pub fn decoder(&self) -> &Arc<MidiDecoder> {
        &self.decoder
    }

    pub fn audio(&self) -> &SharedAudio {
        &self.audio
    }

    pub fn aggregator(&self) -> &IntensityAggregator {
        &self.aggregator
    }

    /// Seconds since the session started
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Evaluate one frame at `time` seconds
    pub fn frame(&self, time: f64, reactivity: f64) -> FrameReadout {
        let lfos = self
            .store
            .lfos()
            .iter()
            .map(|lfo| (lfo.id.clone(), Lfo::evaluate(lfo, time)))
            .collect();

        FrameReadout {
            time,
            intensity: self.aggregator.intensity(reactivity),
            lfos,
            held_notes: self.notes.held_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioAnalysis;
    use crate::mapping::TargetKind;
    use crate::store::ParameterStore;

    #[test]
    fn test_packets_flow_through_to_frame() {
        let session = Session::new(InMemoryStore::with_defaults(), InputMode::Midi);
        session.decoder().handle_packet(&[0x90, 36, 127], "keys", 0.0);

        let frame = session.frame(0.25, 0.5);
        assert_eq!(frame.held_notes, 1);
        assert_eq!(frame.intensity.bass, 0.5);
        // lfo-1: 0.5 Hz sine, depth 1 → sin(π/4)
        let (id, value) = &frame.lfos[0];
        assert_eq!(id, "lfo-1");
        assert!((value - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_learned_mapping_moves_lfo_seen_by_next_frame() {
        let session = Session::new(InMemoryStore::with_defaults(), InputMode::Mix);
        session.mapper().arm_learning(TargetKind::Lfo, "lfo-2", "depth");
        session.decoder().handle_packet(&[0xB0, 16, 5], "knobs", 0.0);
        session.decoder().handle_packet(&[0xB0, 16, 0], "knobs", 1.0);

        assert_eq!(session.store().lfo("lfo-2").unwrap().depth, 0.0);
        let frame = session.frame(0.1, 1.0);
        assert_eq!(frame.lfos[1], ("lfo-2".to_string(), 0.0));
    }

    #[test]
    fn test_audio_register_feeds_aggregator() {
        let session = Session::new(InMemoryStore::with_defaults(), InputMode::Audio);
        assert_eq!(session.frame(0.0, 1.0).intensity, Intensity::default());

        session.audio().publish(AudioAnalysis {
            bass: 0.25,
            mid: 0.0,
            treble: 0.0,
            volume: 0.1,
        });
        let frame = session.frame(0.0, 1.0);
        assert_eq!(frame.intensity.bass, 0.5);
        assert!((frame.intensity.intensity - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_apply_config_switches_mode() {
        let session = Session::new(InMemoryStore::with_defaults(), InputMode::Mix);
        let config =
            AppConfig::from_yaml("input:\n  mode: audio\n  reactivity: 1.5\n").unwrap();
        session.apply_config(&config);
        assert_eq!(session.aggregator().mode(), InputMode::Audio);
        assert_eq!(session.reactivity(), 1.5);
    }
}
