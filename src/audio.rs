//! Audio band analysis contract
//!
//! Capture and FFT live outside this crate. What comes in is either a ready
//! `AudioAnalysis` snapshot or a byte-magnitude spectrum (256 bins from a
//! 512-point FFT at 44.1 kHz, roughly 86 Hz per bin), which `BandAnalyzer`
//! folds into bass, mid, treble and volume.

use parking_lot::RwLock;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

/// Normalized band levels, each in 0-1
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AudioAnalysis {
    pub bass: f64,
    pub mid: f64,
    pub treble: f64,
    pub volume: f64,
}

/// Provider of the latest analysis snapshot.
///
/// `None` means the analyzer is not initialized (no microphone, permission
/// denied, not started yet).
pub trait AudioSource: Send + Sync {
    fn analysis(&self) -> Option<AudioAnalysis>;
}

/// Folds a byte spectrum into bands
pub struct BandAnalyzer;

impl BandAnalyzer {
    /// Bins 0-3, about 0-344 Hz
    pub const BASS_BINS: Range<usize> = 0..4;
    /// Bins 4-29, about 344-2500 Hz
    pub const MID_BINS: Range<usize> = 4..30;
    /// Bins 30-99, about 2500-8600 Hz
    pub const TREBLE_BINS: Range<usize> = 30..100;

    /// Bins past the end of `bins` count as silent
    pub fn analyze(bins: &[u8]) -> AudioAnalysis {
        let bass = Self::band_sum(bins, Self::BASS_BINS);
        let mid = Self::band_sum(bins, Self::MID_BINS);
        let treble = Self::band_sum(bins, Self::TREBLE_BINS);

        AudioAnalysis {
            bass: bass / Self::full_scale(Self::BASS_BINS),
            mid: mid / Self::full_scale(Self::MID_BINS),
            treble: treble / Self::full_scale(Self::TREBLE_BINS),
            volume: (bass + mid + treble) / Self::full_scale(0..Self::TREBLE_BINS.end),
        }
    }

    fn band_sum(bins: &[u8], range: Range<usize>) -> f64 {
        bins.iter()
            .skip(range.start)
            .take(range.len())
            .map(|&b| f64::from(b))
            .sum()
    }

    fn full_scale(range: Range<usize>) -> f64 {
        range.len() as f64 * 255.0
    }
}

/// Latest-value register written by a capture thread, read by the frame loop
#[derive(Debug, Clone, Default)]
pub struct SharedAudio {
    latest: Arc<RwLock<Option<AudioAnalysis>>>,
}

impl SharedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, analysis: AudioAnalysis) {
        *self.latest.write() = Some(analysis);
    }

    /// Analyze a byte spectrum and publish the result
    pub fn publish_bins(&self, bins: &[u8]) -> AudioAnalysis {
        let analysis = BandAnalyzer::analyze(bins);
        self.publish(analysis);
        analysis
    }

    /// Mark the analyzer unavailable again
    pub fn reset(&self) {
        *self.latest.write() = None;
    }
}

impl AudioSource for SharedAudio {
    fn analysis(&self) -> Option<AudioAnalysis> {
        *self.latest.read()
    }
}
