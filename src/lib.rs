//! reactive-mod - MIDI and audio driven modulation for real-time visuals
//!
//! Decodes controller input, tracks held notes, binds CCs to visual
//! parameters through MIDI learn, evaluates LFOs and envelopes, and blends
//! note activity with audio band levels into per-frame intensity readings.

pub mod audio;
pub mod config;
pub mod intensity;
pub mod mapping;
pub mod midi;
pub mod modulation;
pub mod session;
pub mod store;

pub use audio::{AudioAnalysis, AudioSource, BandAnalyzer, SharedAudio};
pub use config::AppConfig;
pub use intensity::{InputMode, Intensity, IntensityAggregator};
pub use mapping::{LearningState, MappingEngine, MidiMapping, TargetKind};
pub use midi::{MidiDecoder, MidiEvent, MidiEventKind, NoteTracker};
pub use modulation::{Envelope, EnvelopeConfig, Lfo, LfoConfig, LfoShape};
pub use session::{FrameReadout, Session};
pub use store::{InMemoryStore, LayerConfig, ParameterStore};
