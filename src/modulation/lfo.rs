//! Low-frequency oscillator evaluation

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use super::default_true;

/// LFO waveform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    Square,
    Saw,
}

impl LfoShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            LfoShape::Sine => "sine",
            LfoShape::Triangle => "triangle",
            LfoShape::Square => "square",
            LfoShape::Saw => "saw",
        }
    }
}

impl fmt::Display for LfoShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LfoShape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sine" => Ok(LfoShape::Sine),
            "triangle" => Ok(LfoShape::Triangle),
            "square" => Ok(LfoShape::Square),
            "saw" => Ok(LfoShape::Saw),
            other => bail!("Unknown LFO shape: {}", other),
        }
    }
}

/// LFO definition as held by the parameter store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LfoConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shape: LfoShape,
    /// Frequency in Hz
    pub rate: f64,
    /// Output amplitude (0-1)
    pub depth: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl LfoConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        shape: LfoShape,
        rate: f64,
        depth: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape,
            rate,
            depth,
            enabled: true,
        }
    }
}

/// Partial LFO update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LfoUpdate {
    pub name: Option<String>,
    pub shape: Option<LfoShape>,
    pub rate: Option<f64>,
    pub depth: Option<f64>,
    pub enabled: Option<bool>,
}

impl LfoUpdate {
    pub fn rate(rate: f64) -> Self {
        Self {
            rate: Some(rate),
            ..Default::default()
        }
    }

    pub fn depth(depth: f64) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    /// Merge the set fields into `lfo`
    pub fn apply_to(&self, lfo: &mut LfoConfig) {
        if let Some(name) = &self.name {
            lfo.name = name.clone();
        }
        if let Some(shape) = self.shape {
            lfo.shape = shape;
        }
        if let Some(rate) = self.rate {
            lfo.rate = rate;
        }
        if let Some(depth) = self.depth {
            lfo.depth = depth;
        }
        if let Some(enabled) = self.enabled {
            lfo.enabled = enabled;
        }
    }
}

/// Stateless LFO evaluator
pub struct Lfo;

impl Lfo {
    /// Value of `config` at `time` seconds, in `[-depth, depth]`.
    ///
    /// Sine, triangle and square run on the angular phase `2π·rate·t`.
    /// Saw is driven by the fractional cycle count `rate·t` instead; presets
    /// are tuned against that, so the two conventions stay distinct.
    pub fn evaluate(config: &LfoConfig, time: f64) -> f64 {
        if !config.enabled {
            return 0.0;
        }

        let phase = 2.0 * PI * config.rate * time;
        let raw = match config.shape {
            LfoShape::Sine => phase.sin(),
            LfoShape::Triangle => ((2.0 / PI) * phase.sin().asin()).clamp(-1.0, 1.0),
            LfoShape::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::Saw => {
                let cycles = config.rate * time;
                2.0 * (cycles - cycles.floor()) - 1.0
            }
        };

        raw * config.depth
    }
}
