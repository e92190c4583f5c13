//! Configuration management for reactive-mod
//!
//! Handles loading, parsing, validation and hot-reloading of the YAML
//! configuration file.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

use crate::intensity::InputMode;
use crate::modulation::{EnvelopeConfig, LfoConfig};
use crate::store::{default_envelopes, default_layers, default_lfos, InMemoryStore, LayerConfig};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    /// Initial layers; stock layer when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerConfig>>,
    /// Initial LFOs; stock LFOs when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfos: Option<Vec<LfoConfig>>,
    /// Initial envelopes; stock envelope when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelopes: Option<Vec<EnvelopeConfig>>,
}

/// MIDI input selection
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Port index or case-insensitive name substring; no MIDI input when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
}

/// Input blending
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub mode: InputMode,
    /// Reactivity used by the frame loop readout
    #[serde(default = "default_reactivity")]
    pub reactivity: f64,
}

/// Frame loop timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FrameConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mode: InputMode::default(),
            reactivity: default_reactivity(),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = &self.midi.input_port {
            if port.trim().is_empty() {
                anyhow::bail!("MIDI input_port cannot be empty (omit it to run without MIDI)");
            }
        }

        if !self.input.reactivity.is_finite() || self.input.reactivity < 0.0 {
            anyhow::bail!(
                "input.reactivity must be a non-negative number, got {}",
                self.input.reactivity
            );
        }

        if self.frame.fps == 0 || self.frame.fps > 240 {
            anyhow::bail!("frame.fps must be between 1 and 240, got {}", self.frame.fps);
        }

        if let Some(layers) = &self.layers {
            let mut ids = HashSet::new();
            for layer in layers {
                if layer.id.is_empty() {
                    anyhow::bail!("Layer '{}' id cannot be empty", layer.name);
                }
                if !ids.insert(layer.id.as_str()) {
                    anyhow::bail!("Duplicate layer id '{}'", layer.id);
                }
                if !(0.0..=1.0).contains(&layer.opacity) {
                    anyhow::bail!(
                        "Layer '{}' has invalid opacity {} (must be 0-1)",
                        layer.id, layer.opacity
                    );
                }
                if !(0.0..=2.0).contains(&layer.reactivity) {
                    anyhow::bail!(
                        "Layer '{}' has invalid reactivity {} (must be 0-2)",
                        layer.id, layer.reactivity
                    );
                }
            }
        }

        if let Some(lfos) = &self.lfos {
            let mut ids = HashSet::new();
            for lfo in lfos {
                if lfo.id.is_empty() {
                    anyhow::bail!("LFO '{}' id cannot be empty", lfo.name);
                }
                if !ids.insert(lfo.id.as_str()) {
                    anyhow::bail!("Duplicate LFO id '{}'", lfo.id);
                }
                if !(lfo.rate > 0.0 && lfo.rate.is_finite()) {
                    anyhow::bail!("LFO '{}' rate must be > 0 Hz, got {}", lfo.id, lfo.rate);
                }
                if !(0.0..=1.0).contains(&lfo.depth) {
                    anyhow::bail!("LFO '{}' has invalid depth {} (must be 0-1)", lfo.id, lfo.depth);
                }
            }
        }

        if let Some(envelopes) = &self.envelopes {
            let mut ids = HashSet::new();
            for env in envelopes {
                if !ids.insert(env.id.as_str()) {
                    anyhow::bail!("Duplicate envelope id '{}'", env.id);
                }
                for (stage, seconds) in [
                    ("attack", env.attack),
                    ("decay", env.decay),
                    ("release", env.release),
                ] {
                    if !(seconds >= 0.0 && seconds.is_finite()) {
                        anyhow::bail!(
                            "Envelope '{}' {} must be >= 0 seconds, got {}",
                            env.id, stage, seconds
                        );
                    }
                }
                if !(0.0..=1.0).contains(&env.sustain) {
                    anyhow::bail!(
                        "Envelope '{}' has invalid sustain {} (must be 0-1)",
                        env.id, env.sustain
                    );
                }
            }
        }

        Ok(())
    }

    /// Parameter store seeded from this config
    pub fn build_store(&self) -> InMemoryStore {
        InMemoryStore::new(
            self.layers.clone().unwrap_or_else(default_layers),
            self.lfos.clone().unwrap_or_else(default_lfos),
            self.envelopes.clone().unwrap_or_else(default_envelopes),
        )
    }

    /// Whether `self` changes anything a running session picks up
    /// (input mode and reactivity)
    pub fn has_live_changes(&self, running: &AppConfig) -> bool {
        self.input != running.input
    }

    /// Fields that differ from `running` but only take effect on restart.
    ///
    /// The store is seeded once, so layer, LFO and envelope lists count too.
    pub fn restart_required_changes(&self, running: &AppConfig) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.midi.input_port != running.midi.input_port {
            fields.push("midi.input_port");
        }
        if self.frame.fps != running.frame.fps {
            fields.push("frame.fps");
        }
        if self.layers != running.layers {
            fields.push("layers");
        }
        if self.lfos != running.lfos {
            fields.push("lfos");
        }
        if self.envelopes != running.envelopes {
            fields.push("envelopes");
        }
        fields
    }

    /// Time between frame loop ticks
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame.fps.max(1)))
    }
}

// Default value functions
fn default_reactivity() -> f64 { 1.0 }
fn default_fps() -> u32 { 60 }
