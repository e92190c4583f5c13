//! Parameter store
//!
//! Keyed object store for visual layers, LFOs and envelopes with
//! partial-field merge updates. The mapping engine writes through the
//! `ParameterStore` trait; generators and the frame loop read copies.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::modulation::{EnvelopeConfig, EnvelopeUpdate, LfoConfig, LfoShape, LfoUpdate};

/// Visual generator type of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualKind {
    Particles,
    Shapes,
    Spiral,
    Rings,
    Hexgrid,
    Cubefield,
    Waveform,
    Terrain,
    Tunnel,
    Plasma,
    Prism,
}

/// Layer compositing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
}

/// One visual layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VisualKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0-1
    #[serde(default = "default_one")]
    pub opacity: f64,
    /// Intensity multiplier (0-2)
    #[serde(default = "default_one")]
    pub reactivity: f64,
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Generator-specific parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl LayerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: VisualKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            enabled: true,
            opacity: 1.0,
            reactivity: 1.0,
            blend_mode: BlendMode::Normal,
            params: Map::new(),
        }
    }

    /// Numeric generator parameter, if present
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }
}

/// Partial layer update; `None` fields are left untouched.
///
/// `params` replaces the whole parameter map, so callers merge first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub opacity: Option<f64>,
    pub reactivity: Option<f64>,
    pub blend_mode: Option<BlendMode>,
    pub params: Option<Map<String, Value>>,
}

impl LayerUpdate {
    pub fn opacity(opacity: f64) -> Self {
        Self {
            opacity: Some(opacity),
            ..Default::default()
        }
    }

    pub fn reactivity(reactivity: f64) -> Self {
        Self {
            reactivity: Some(reactivity),
            ..Default::default()
        }
    }

    pub fn params(params: Map<String, Value>) -> Self {
        Self {
            params: Some(params),
            ..Default::default()
        }
    }

    pub fn apply_to(self, layer: &mut LayerConfig) {
        if let Some(name) = self.name {
            layer.name = name;
        }
        if let Some(enabled) = self.enabled {
            layer.enabled = enabled;
        }
        if let Some(opacity) = self.opacity {
            layer.opacity = opacity;
        }
        if let Some(reactivity) = self.reactivity {
            layer.reactivity = reactivity;
        }
        if let Some(blend_mode) = self.blend_mode {
            layer.blend_mode = blend_mode;
        }
        if let Some(params) = self.params {
            layer.params = params;
        }
    }
}

/// Read/write surface the mapping engine drives
pub trait ParameterStore: Send + Sync {
    fn layer(&self, id: &str) -> Option<LayerConfig>;

    /// Merge `update` into the layer. Returns false if the layer does not exist.
    fn update_layer(&self, id: &str, update: LayerUpdate) -> bool;

    fn lfo(&self, id: &str) -> Option<LfoConfig>;

    /// Merge `update` into the LFO. Returns false if the LFO does not exist.
    fn update_lfo(&self, id: &str, update: LfoUpdate) -> bool;
}

#[derive(Debug, Default)]
struct StoreData {
    layers: Vec<LayerConfig>,
    lfos: Vec<LfoConfig>,
    envelopes: Vec<EnvelopeConfig>,
}

/// In-process parameter store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new(
        layers: Vec<LayerConfig>,
        lfos: Vec<LfoConfig>,
        envelopes: Vec<EnvelopeConfig>,
    ) -> Self {
        Self {
            data: RwLock::new(StoreData {
                layers,
                lfos,
                envelopes,
            }),
        }
    }

    /// Store seeded with the stock layer, LFOs and envelope
    pub fn with_defaults() -> Self {
        Self::new(default_layers(), default_lfos(), default_envelopes())
    }

    pub fn layers(&self) -> Vec<LayerConfig> {
        self.data.read().layers.clone()
    }

    pub fn lfos(&self) -> Vec<LfoConfig> {
        self.data.read().lfos.clone()
    }

    pub fn envelopes(&self) -> Vec<EnvelopeConfig> {
        self.data.read().envelopes.clone()
    }

    pub fn envelope(&self, id: &str) -> Option<EnvelopeConfig> {
        self.data.read().envelopes.iter().find(|e| e.id == id).cloned()
    }

    pub fn update_envelope(&self, id: &str, update: EnvelopeUpdate) -> bool {
        let mut data = self.data.write();
        match data.envelopes.iter_mut().find(|e| e.id == id) {
            Some(env) => {
                update.apply_to(env);
                true
            }
            None => false,
        }
    }

    pub fn add_layer(&self, layer: LayerConfig) {
        debug!("Adding layer '{}' ({})", layer.id, layer.name);
        self.data.write().layers.push(layer);
    }

    pub fn remove_layer(&self, id: &str) -> bool {
        let mut data = self.data.write();
        let before = data.layers.len();
        data.layers.retain(|l| l.id != id);
        data.layers.len() != before
    }

    /// Append a new sine LFO (1 Hz, depth 0.5) and return it
    pub fn add_lfo(&self) -> LfoConfig {
        let mut data = self.data.write();

        let mut n = data.lfos.len() + 1;
        let id = loop {
            let candidate = format!("lfo-{}", n);
            if !data.lfos.iter().any(|l| l.id == candidate) {
                break candidate;
            }
            n += 1;
        };

        let lfo = LfoConfig::new(
            id,
            format!("LFO {}", data.lfos.len() + 1),
            LfoShape::Sine,
            1.0,
            0.5,
        );
        debug!("Adding LFO '{}'", lfo.id);
        data.lfos.push(lfo.clone());
        lfo
    }

    pub fn remove_lfo(&self, id: &str) -> bool {
        let mut data = self.data.write();
        let before = data.lfos.len();
        data.lfos.retain(|l| l.id != id);
        data.lfos.len() != before
    }
}

impl ParameterStore for InMemoryStore {
    fn layer(&self, id: &str) -> Option<LayerConfig> {
        self.data.read().layers.iter().find(|l| l.id == id).cloned()
    }

    fn update_layer(&self, id: &str, update: LayerUpdate) -> bool {
        let mut data = self.data.write();
        match data.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                update.apply_to(layer);
                true
            }
            None => false,
        }
    }

    fn lfo(&self, id: &str) -> Option<LfoConfig> {
        self.data.read().lfos.iter().find(|l| l.id == id).cloned()
    }

    fn update_lfo(&self, id: &str, update: LfoUpdate) -> bool {
        let mut data = self.data.write();
        match data.lfos.iter_mut().find(|l| l.id == id) {
            Some(lfo) => {
                update.apply_to(lfo);
                true
            }
            None => false,
        }
    }
}

/// Stock particle layer
pub fn default_layers() -> Vec<LayerConfig> {
    let mut layer = LayerConfig::new("layer-1", "Base Particles", VisualKind::Particles);
    layer.blend_mode = BlendMode::Screen;
    layer.params.insert("count".to_string(), Value::from(3000));
    vec![layer]
}

/// Stock LFOs: slow sine orbit and a faster half-depth saw
pub fn default_lfos() -> Vec<LfoConfig> {
    vec![
        LfoConfig::new("lfo-1", "LFO 1", LfoShape::Sine, 0.5, 1.0),
        LfoConfig::new("lfo-2", "LFO 2", LfoShape::Saw, 2.0, 0.5),
    ]
}

pub fn default_envelopes() -> Vec<EnvelopeConfig> {
    vec![EnvelopeConfig::new("env-1", "Env 1", 0.1, 0.2, 0.5, 0.5)]
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = InMemoryStore::with_defaults();
        let layer = store.layer("layer-1").unwrap();
        assert_eq!(layer.kind, VisualKind::Particles);
        assert_eq!(layer.param_f64("count"), Some(3000.0));
        assert_eq!(store.lfo("lfo-2").unwrap().shape, LfoShape::Saw);
        assert_eq!(store.envelope("env-1").unwrap().sustain, 0.5);
    }

    #[test]
    fn test_partial_layer_update() {
        let store = InMemoryStore::with_defaults();
        assert!(store.update_layer("layer-1", LayerUpdate::opacity(0.25)));

        let layer = store.layer("layer-1").unwrap();
        assert_eq!(layer.opacity, 0.25);
        assert_eq!(layer.reactivity, 1.0);
        assert_eq!(layer.param_f64("count"), Some(3000.0));
    }

    #[test]
    fn test_update_missing_entity_reports_false() {
        let store = InMemoryStore::with_defaults();
        assert!(!store.update_layer("nope", LayerUpdate::opacity(0.5)));
        assert!(!store.update_lfo("nope", LfoUpdate::rate(2.0)));
        assert!(!store.update_envelope("nope", EnvelopeUpdate::default()));
    }

    #[test]
    fn test_add_lfo_picks_free_id() {
        let store = InMemoryStore::with_defaults();
        store.remove_lfo("lfo-1");
        // one LFO left ("lfo-2"), so the first candidate collides
        let lfo = store.add_lfo();
        assert_eq!(lfo.id, "lfo-3");
        assert_eq!(lfo.name, "LFO 2");
        assert_eq!(store.lfos().len(), 2);
    }

    #[test]
    fn test_remove_layer() {
        let store = InMemoryStore::with_defaults();
        store.add_layer(LayerConfig::new("lyr-rings", "Cosmic Bands", VisualKind::Rings));
        assert!(store.remove_layer("layer-1"));
        assert!(!store.remove_layer("layer-1"));
        assert_eq!(store.layers().len(), 1);
    }

    #[test]
    fn test_layer_yaml_shape() {
        let yaml = r#"
id: lyr-spiral
name: Golden Spiral
type: spiral
reactivity: 1.5
params:
  count: 3000
"#;
        let layer: LayerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(layer.kind, VisualKind::Spiral);
        assert_eq!(layer.opacity, 1.0);
        assert_eq!(layer.blend_mode, BlendMode::Normal);
        assert_eq!(layer.param_f64("count"), Some(3000.0));
    }
}
