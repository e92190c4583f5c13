//! ADSR envelope evaluation
//!
//! Piecewise-linear attack/decay/sustain/release. The caller owns the
//! trigger and release timestamps; evaluation is a pure function of them.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Envelope definition as held by the parameter store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub id: String,
    pub name: String,
    /// Seconds
    pub attack: f64,
    /// Seconds
    pub decay: f64,
    /// Level (0-1)
    pub sustain: f64,
    /// Seconds
    pub release: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EnvelopeConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attack,
            decay,
            sustain,
            release,
            enabled: true,
        }
    }
}

/// Partial envelope update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeUpdate {
    pub name: Option<String>,
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
    pub enabled: Option<bool>,
}

impl EnvelopeUpdate {
    pub fn apply_to(&self, env: &mut EnvelopeConfig) {
        if let Some(name) = &self.name {
            env.name = name.clone();
        }
        if let Some(attack) = self.attack {
            env.attack = attack;
        }
        if let Some(decay) = self.decay {
            env.decay = decay;
        }
        if let Some(sustain) = self.sustain {
            env.sustain = sustain;
        }
        if let Some(release) = self.release {
            env.release = release;
        }
        if let Some(enabled) = self.enabled {
            env.enabled = enabled;
        }
    }
}

/// Stage an envelope is in at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    /// Disabled, or not triggered yet
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
    /// Release window has fully elapsed
    Finished,
}

/// Stateless ADSR evaluator
pub struct Envelope;

impl Envelope {
    /// Envelope level at `now`, in `[0, 1]`.
    ///
    /// `release_time` of `None` means the gate is still held. Before
    /// `release_time` is reached the level holds at sustain.
    pub fn evaluate(
        config: &EnvelopeConfig,
        now: f64,
        trigger_time: f64,
        release_time: Option<f64>,
    ) -> f64 {
        Self::resolve(config, now, trigger_time, release_time).1
    }

    /// Stage the envelope is in at `now`
    pub fn phase(
        config: &EnvelopeConfig,
        now: f64,
        trigger_time: f64,
        release_time: Option<f64>,
    ) -> EnvelopePhase {
        Self::resolve(config, now, trigger_time, release_time).0
    }

    fn resolve(
        config: &EnvelopeConfig,
        now: f64,
        trigger_time: f64,
        release_time: Option<f64>,
    ) -> (EnvelopePhase, f64) {
        if !config.enabled {
            return (EnvelopePhase::Idle, 0.0);
        }

        let since_trigger = now - trigger_time;
        if since_trigger < 0.0 {
            return (EnvelopePhase::Idle, 0.0);
        }

        if since_trigger < config.attack {
            return (EnvelopePhase::Attack, since_trigger / config.attack);
        }

        let since_peak = since_trigger - config.attack;
        if since_peak < config.decay {
            let level = 1.0 - (since_peak / config.decay) * (1.0 - config.sustain);
            return (EnvelopePhase::Decay, level);
        }

        let Some(release_time) = release_time else {
            return (EnvelopePhase::Sustain, config.sustain);
        };

        let since_release = now - release_time;
        if since_release < 0.0 {
            return (EnvelopePhase::Sustain, config.sustain);
        }

        if since_release < config.release {
            let level = config.sustain * (1.0 - since_release / config.release);
            return (EnvelopePhase::Release, level);
        }

        (EnvelopePhase::Finished, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn adsr() -> EnvelopeConfig {
        EnvelopeConfig::new("env-1", "Env 1", 0.1, 0.2, 0.5, 0.5)
    }

    #[test]
    fn test_reference_shape_without_release() {
        let env = adsr();
        assert!((Envelope::evaluate(&env, 0.05, 0.0, None) - 0.5).abs() < EPS);
        assert_eq!(Envelope::evaluate(&env, 0.1, 0.0, None), 1.0);
        assert!((Envelope::evaluate(&env, 0.2, 0.0, None) - 0.75).abs() < EPS);
        assert!((Envelope::evaluate(&env, 0.3, 0.0, None) - 0.5).abs() < EPS);
        assert_eq!(Envelope::evaluate(&env, 42.0, 0.0, None), 0.5);
        assert_eq!(Envelope::phase(&env, 42.0, 0.0, None), EnvelopePhase::Sustain);
    }

    #[test]
    fn test_reference_shape_with_release() {
        let env = adsr();
        let release = Some(1.0);
        assert_eq!(Envelope::evaluate(&env, 0.9, 0.0, release), 0.5);
        assert!((Envelope::evaluate(&env, 1.25, 0.0, release) - 0.25).abs() < EPS);
        assert_eq!(Envelope::phase(&env, 1.25, 0.0, release), EnvelopePhase::Release);
        assert_eq!(Envelope::evaluate(&env, 1.5, 0.0, release), 0.0);
        assert_eq!(Envelope::evaluate(&env, 10.0, 0.0, release), 0.0);
        assert_eq!(Envelope::phase(&env, 10.0, 0.0, release), EnvelopePhase::Finished);
    }

    #[test]
    fn test_before_trigger_and_disabled() {
        let mut env = adsr();
        assert_eq!(Envelope::evaluate(&env, 4.9, 5.0, None), 0.0);
        assert_eq!(Envelope::phase(&env, 4.9, 5.0, None), EnvelopePhase::Idle);

        env.enabled = false;
        assert_eq!(Envelope::evaluate(&env, 5.05, 5.0, None), 0.0);
    }

    #[test]
    fn test_trigger_offset_shifts_the_curve() {
        let env = adsr();
        assert!((Envelope::evaluate(&env, 10.05, 10.0, None) - 0.5).abs() < EPS);
        assert_eq!(Envelope::phase(&env, 10.05, 10.0, None), EnvelopePhase::Attack);
        assert_eq!(Envelope::phase(&env, 10.2, 10.0, None), EnvelopePhase::Decay);
    }

    #[test]
    fn test_zero_length_stages_do_not_divide_by_zero() {
        let env = EnvelopeConfig::new("env-z", "Zero", 0.0, 0.0, 0.7, 0.0);
        assert_eq!(Envelope::evaluate(&env, 0.0, 0.0, None), 0.7);
        assert_eq!(Envelope::evaluate(&env, 2.0, 0.0, Some(1.0)), 0.0);
    }

    #[test]
    fn test_update_merges_only_set_fields() {
        let mut env = adsr();
        EnvelopeUpdate {
            sustain: Some(0.9),
            ..Default::default()
        }
        .apply_to(&mut env);
        assert_eq!(env.sustain, 0.9);
        assert_eq!(env.attack, 0.1);
    }
}
