//! Modulation sources
//!
//! Pure evaluators for LFOs and ADSR envelopes. Nothing here keeps state
//! between calls: LFO phase comes from elapsed time, envelope position from
//! the trigger and release timestamps handed in by the caller.

pub mod envelope;
pub mod lfo;

pub use envelope::{Envelope, EnvelopeConfig, EnvelopePhase, EnvelopeUpdate};
pub use lfo::{Lfo, LfoConfig, LfoShape, LfoUpdate};

fn default_true() -> bool {
    true
}
