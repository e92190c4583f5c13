//! MIDI event types and packet decoding
//!
//! Classifies raw 1-3 byte packets into the four event kinds the modulation
//! pipeline consumes. Anything else (system real-time, sysex, aftertouch,
//! program change, stray data bytes) is filtered out.

pub mod decoder;
pub mod device;
pub mod notes;

use serde::Serialize;
use std::fmt;

pub use decoder::{ListenerId, MidiDecoder};
pub use device::{DeviceError, MidiDeviceInfo, MidiInputDevice};
pub use notes::{HeldNote, NoteKey, NoteTracker};

/// Kind of a decoded MIDI event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
    ControlChange,
    PitchBend,
}

impl MidiEventKind {
    /// Classify from the status byte and second data byte.
    ///
    /// A Note On with velocity 0 is a Note Off.
    pub fn classify(status: u8, data2: u8) -> Option<Self> {
        match status >> 4 {
            0x9 if data2 > 0 => Some(MidiEventKind::NoteOn),
            0x8 | 0x9 => Some(MidiEventKind::NoteOff),
            0xB => Some(MidiEventKind::ControlChange),
            0xE => Some(MidiEventKind::PitchBend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MidiEventKind::NoteOn => "note_on",
            MidiEventKind::NoteOff => "note_off",
            MidiEventKind::ControlChange => "cc",
            MidiEventKind::PitchBend => "pitch_bend",
        }
    }
}

/// A decoded MIDI event. Created per packet and consumed synchronously.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidiEvent {
    pub kind: MidiEventKind,
    /// Channel (0-15)
    pub channel: u8,
    /// Note number or controller number (0-127)
    pub data1: u8,
    /// Velocity or controller value (0-127)
    pub data2: u8,
    /// Identifier of the input device the packet came from
    pub device_id: String,
    /// Monotonic timestamp in milliseconds
    pub timestamp: f64,
}

impl MidiEvent {
    /// Decode a raw three-byte packet.
    ///
    /// Returns `None` for packets shorter than three bytes and for status
    /// nibbles outside Note On/Off, Control Change and Pitch Bend.
    pub fn decode(data: &[u8], device_id: &str, timestamp: f64) -> Option<Self> {
        let &[status, data1, data2, ..] = data else {
            return None;
        };
        let (data1, data2) = (data1 & 0x7F, data2 & 0x7F);

        let kind = MidiEventKind::classify(status, data2)?;

        Some(MidiEvent {
            kind,
            channel: status & 0x0F,
            data1,
            data2,
            device_id: device_id.to_string(),
            timestamp,
        })
    }

    /// Controller value or velocity scaled to 0-1
    pub fn normalized(&self) -> f64 {
        f64::from(self.data2) / 127.0
    }

    /// 14-bit pitch bend value (0-16383, center 8192)
    pub fn pitch_bend_value(&self) -> Option<u16> {
        match self.kind {
            MidiEventKind::PitchBend => {
                Some((u16::from(self.data2) << 7) | u16::from(self.data1))
            }
            _ => None,
        }
    }

    /// Re-encode as wire bytes (Note Off is always emitted as 0x8n)
    pub fn encode(&self) -> [u8; 3] {
        let status = match self.kind {
            MidiEventKind::NoteOn => 0x90,
            MidiEventKind::NoteOff => 0x80,
            MidiEventKind::ControlChange => 0xB0,
            MidiEventKind::PitchBend => 0xE0,
        };
        [status | (self.channel & 0x0F), self.data1, self.data2]
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MidiEventKind::NoteOn => write!(
                f,
                "NoteOn ch:{} n:{} v:{}",
                self.channel + 1,
                self.data1,
                self.data2
            ),
            MidiEventKind::NoteOff => {
                write!(f, "NoteOff ch:{} n:{}", self.channel + 1, self.data1)
            }
            MidiEventKind::ControlChange => write!(
                f,
                "CC ch:{} cc:{} v:{}",
                self.channel + 1,
                self.data1,
                self.data2
            ),
            MidiEventKind::PitchBend => write!(
                f,
                "PitchBend ch:{} v:{}",
                self.channel + 1,
                self.pitch_bend_value().unwrap_or(8192)
            ),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
