//! Parameter scaling rules for mapped controller values
//!
//! `value` is always the normalized controller position (0-1). Unknown
//! parameter paths are ignored.

use serde_json::Value;
use tracing::trace;

use super::{MappingTarget, TargetKind};
use crate::modulation::LfoUpdate;
use crate::store::{LayerUpdate, ParameterStore};

pub const PARTICLE_COUNT_MIN: f64 = 100.0;
pub const PARTICLE_COUNT_MAX: f64 = 5000.0;
const LAYER_REACTIVITY_MAX: f64 = 2.0;
const LFO_RATE_MIN: f64 = 0.1;
const LFO_RATE_SPAN: f64 = 10.0;

/// Write `value` to the mapped parameter.
///
/// Returns false when the target entity is gone or the path is not mappable.
pub fn apply_value(store: &dyn ParameterStore, target: &MappingTarget, value: f64) -> bool {
    let id = target.target_id.as_str();

    match target.kind {
        TargetKind::Layer => {
            let Some(layer) = store.layer(id) else {
                return false;
            };

            let update = match target.param_path.as_str() {
                "opacity" => LayerUpdate::opacity(value),
                "reactivity" => LayerUpdate::reactivity(value * LAYER_REACTIVITY_MAX),
                "params.count" => {
                    let count = PARTICLE_COUNT_MIN
                        + (value * (PARTICLE_COUNT_MAX - PARTICLE_COUNT_MIN)).floor();
                    let mut params = layer.params;
                    // whole number, stored as an integer
                    params.insert("count".to_string(), Value::from(count as u64));
                    LayerUpdate::params(params)
                }
                other => {
                    trace!("Ignoring unknown layer param '{}'", other);
                    return false;
                }
            };

            store.update_layer(id, update)
        }
        TargetKind::Lfo => {
            if store.lfo(id).is_none() {
                return false;
            }

            let update = match target.param_path.as_str() {
                "rate" => LfoUpdate::rate(LFO_RATE_MIN + value * LFO_RATE_SPAN),
                "depth" => LfoUpdate::depth(value),
                other => {
                    trace!("Ignoring unknown LFO param '{}'", other);
                    return false;
                }
            };

            store.update_lfo(id, update)
        }
    }
}
