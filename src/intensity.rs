//! Input intensity aggregation
//!
//! Blends held MIDI notes and audio band levels into one normalized
//! `{intensity, bass, mid, treble}` reading. Generators pull a reading every
//! frame, scaled by their own reactivity.

use anyhow::bail;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::audio::{AudioAnalysis, AudioSource};
use crate::midi::notes::{ActiveNoteSet, NoteTracker};

/// Notes below this are bass
pub const BASS_CEILING: u8 = 48;
/// Notes above this are treble
pub const TREBLE_FLOOR: u8 = 72;
/// Extra gain for audio input, whose levels sit low in practice
const AUDIO_GAIN: f64 = 2.0;

/// Which inputs drive the reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Midi,
    Audio,
    /// Per-field maximum of MIDI and audio
    #[default]
    Mix,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMode::Midi => "midi",
            InputMode::Audio => "audio",
            InputMode::Mix => "mix",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "midi" => Ok(InputMode::Midi),
            "audio" => Ok(InputMode::Audio),
            "mix" => Ok(InputMode::Mix),
            other => bail!("Unknown input mode: {} (expected midi, audio or mix)", other),
        }
    }
}

/// One aggregated reading, every field in 0-1
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Intensity {
    pub intensity: f64,
    pub bass: f64,
    pub mid: f64,
    pub treble: f64,
}

impl Intensity {
    /// Scale every field by `gain` and clamp into 0-1
    fn scaled(self, gain: f64) -> Self {
        Self {
            intensity: unit(self.intensity * gain),
            bass: unit(self.bass * gain),
            mid: unit(self.mid * gain),
            treble: unit(self.treble * gain),
        }
    }

    /// Per-field maximum
    pub fn max(self, other: Self) -> Self {
        Self {
            intensity: self.intensity.max(other.intensity),
            bass: self.bass.max(other.bass),
            mid: self.mid.max(other.mid),
            treble: self.treble.max(other.treble),
        }
    }
}

/// Clamp to 0-1; NaN reads as 0
fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Raw velocity sums per register. Not divided by note count: denser
/// chords read as more intense.
fn note_bands(notes: &ActiveNoteSet) -> Intensity {
    notes.iter().fold(Intensity::default(), |mut acc, held| {
        acc.intensity += held.velocity;
        if held.note < BASS_CEILING {
            acc.bass += held.velocity;
        } else if held.note > TREBLE_FLOOR {
            acc.treble += held.velocity;
        } else {
            acc.mid += held.velocity;
        }
        acc
    })
}

fn audio_bands(analysis: AudioAnalysis) -> Intensity {
    Intensity {
        intensity: analysis.volume,
        bass: analysis.bass,
        mid: analysis.mid,
        treble: analysis.treble,
    }
}

/// Reads the note tracker and the audio source on demand
#[derive(Clone)]
pub struct IntensityAggregator {
    notes: NoteTracker,
    audio: Option<Arc<dyn AudioSource>>,
    mode: Arc<RwLock<InputMode>>,
}

impl IntensityAggregator {
    pub fn new(notes: NoteTracker, audio: Option<Arc<dyn AudioSource>>, mode: InputMode) -> Self {
        Self {
            notes,
            audio,
            mode: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn mode(&self) -> InputMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: InputMode) {
        *self.mode.write() = mode;
    }

    /// Reading for a consumer with the given reactivity
    pub fn intensity(&self, reactivity: f64) -> Intensity {
        match self.mode() {
            InputMode::Midi => self.midi_estimate(reactivity),
            InputMode::Audio => self.audio_estimate(reactivity),
            InputMode::Mix => self
                .midi_estimate(reactivity)
                .max(self.audio_estimate(reactivity)),
        }
    }

    /// Held-note estimate; all zero when nothing is held
    pub fn midi_estimate(&self, reactivity: f64) -> Intensity {
        self.notes.with_notes(note_bands).scaled(reactivity)
    }

    /// Audio estimate; all zero when no analyzer is available
    pub fn audio_estimate(&self, reactivity: f64) -> Intensity {
        self.audio
            .as_ref()
            .and_then(|source| source.analysis())
            .map(|analysis| audio_bands(analysis).scaled(reactivity * AUDIO_GAIN))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SharedAudio;
    use crate::midi::MidiEvent;
    use proptest::prelude::*;

    fn setup(mode: InputMode) -> (NoteTracker, SharedAudio, IntensityAggregator) {
        let notes = NoteTracker::new();
        let audio = SharedAudio::new();
        let source: Arc<dyn AudioSource> = Arc::new(audio.clone());
        let aggregator = IntensityAggregator::new(notes.clone(), Some(source), mode);
        (notes, audio, aggregator)
    }

    fn hold(notes: &NoteTracker, note: u8, velocity: u8) {
        notes.apply(&MidiEvent::decode(&[0x90, note, velocity], "test", 0.0).unwrap());
    }

    #[test]
    fn test_nothing_held_and_no_audio_is_zero() {
        let aggregator = IntensityAggregator::new(NoteTracker::new(), None, InputMode::Mix);
        assert_eq!(aggregator.intensity(2.0), Intensity::default());
    }

    #[test]
    fn test_midi_buckets_by_note_number() {
        let (notes, _, aggregator) = setup(InputMode::Midi);
        hold(&notes, 47, 127); // bass
        hold(&notes, 48, 127); // mid, lower edge
        hold(&notes, 72, 127); // mid, upper edge
        hold(&notes, 73, 127); // treble

        let reading = aggregator.intensity(0.25);
        assert_eq!(reading.bass, 0.25);
        assert_eq!(reading.mid, 0.5);
        assert_eq!(reading.treble, 0.25);
        assert_eq!(reading.intensity, 1.0);
    }

    #[test]
    fn test_midi_sum_is_not_normalized_by_count() {
        let (notes, _, aggregator) = setup(InputMode::Midi);
        hold(&notes, 60, 32);
        let single = aggregator.intensity(1.0).intensity;
        hold(&notes, 64, 32);
        hold(&notes, 67, 32);
        let chord = aggregator.intensity(1.0).intensity;
        assert!((chord - 3.0 * single).abs() < 1e-12);
    }

    #[test]
    fn test_audio_mode_applies_double_gain() {
        let (notes, audio, aggregator) = setup(InputMode::Audio);
        hold(&notes, 30, 127);
        audio.publish(AudioAnalysis {
            bass: 0.1,
            mid: 0.2,
            treble: 0.3,
            volume: 0.6,
        });

        let reading = aggregator.intensity(1.0);
        assert!((reading.bass - 0.2).abs() < 1e-12);
        assert!((reading.mid - 0.4).abs() < 1e-12);
        assert!((reading.treble - 0.6).abs() < 1e-12);
        assert_eq!(reading.intensity, 1.0);
    }

    #[test]
    fn test_mix_takes_per_field_maximum() {
        let (notes, audio, aggregator) = setup(InputMode::Mix);
        // MIDI: intensity 0.3, all of it in bass
        hold(&notes, 36, 127);
        audio.publish(AudioAnalysis {
            bass: 0.05,
            mid: 0.1,
            treble: 0.0,
            volume: 0.3,
        });

        let reading = aggregator.intensity(0.3);
        // audio: 0.3 * 0.3 * 2 = 0.18 < 0.3 on intensity; 0.06 on mid
        assert!((reading.intensity - 0.3).abs() < 1e-12);
        assert!((reading.bass - 0.3).abs() < 1e-12);
        assert!((reading.mid - 0.06).abs() < 1e-12);
        assert_eq!(reading.treble, 0.0);

        audio.publish(AudioAnalysis {
            bass: 0.0,
            mid: 0.0,
            treble: 0.0,
            volume: 1.0,
        });
        let reading = aggregator.intensity(0.3);
        assert!((reading.intensity - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_mode_switch() {
        let (notes, _, aggregator) = setup(InputMode::Audio);
        hold(&notes, 60, 127);
        assert_eq!(aggregator.intensity(1.0).mid, 0.0);

        aggregator.set_mode(InputMode::Midi);
        assert_eq!(aggregator.mode(), InputMode::Midi);
        assert_eq!(aggregator.intensity(1.0).mid, 1.0);
    }

    #[test]
    fn test_input_mode_parsing() {
        assert_eq!("MIX".parse::<InputMode>().unwrap(), InputMode::Mix);
        assert!("both".parse::<InputMode>().is_err());
        assert_eq!(InputMode::default(), InputMode::Mix);
    }

    fn any_mode() -> impl Strategy<Value = InputMode> {
        prop_oneof![Just(InputMode::Midi), Just(InputMode::Audio), Just(InputMode::Mix)]
    }

    proptest! {
        #[test]
        fn prop_every_field_is_clamped(
            mode in any_mode(),
            held in proptest::collection::vec((0u8..128, 1u8..128), 0..24),
            levels in proptest::array::uniform4(0.0f64..=1.0),
            reactivity in -4.0f64..8.0,
        ) {
            let (notes, audio, aggregator) = setup(mode);
            for (note, velocity) in held {
                hold(&notes, note, velocity);
            }
            audio.publish(AudioAnalysis {
                bass: levels[0],
                mid: levels[1],
                treble: levels[2],
                volume: levels[3],
            });

            let reading = aggregator.intensity(reactivity);
            for field in [reading.intensity, reading.bass, reading.mid, reading.treble] {
                prop_assert!((0.0..=1.0).contains(&field));
            }
        }
    }
}
