//! Active note tracking
//!
//! `ActiveNoteSet` holds a velocity for every `(channel, note)` whose most
//! recent event was a Note On. `NoteTracker` wraps it in a lock so the MIDI
//! callback thread can write while the frame loop reads.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{MidiEvent, MidiEventKind};

/// Key of a held note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteKey {
    pub channel: u8,
    pub note: u8,
}

/// Copy of one held note, as handed to readers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldNote {
    pub channel: u8,
    pub note: u8,
    /// Velocity scaled to 0-1
    pub velocity: f64,
}

/// Currently held notes
#[derive(Debug, Clone, Default)]
pub struct ActiveNoteSet {
    notes: HashMap<NoteKey, f64>,
}

impl ActiveNoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a Note On with a 7-bit velocity
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.notes
            .insert(NoteKey { channel, note }, f64::from(velocity) / 127.0);
    }

    /// Remove a held note. Returns false if it was not held.
    pub fn note_off(&mut self, channel: u8, note: u8) -> bool {
        self.notes.remove(&NoteKey { channel, note }).is_some()
    }

    /// Apply a decoded event; only Note On/Off change the set
    pub fn apply(&mut self, event: &MidiEvent) {
        match event.kind {
            MidiEventKind::NoteOn => self.note_on(event.channel, event.data1, event.data2),
            MidiEventKind::NoteOff => {
                self.note_off(event.channel, event.data1);
            }
            MidiEventKind::ControlChange | MidiEventKind::PitchBend => {}
        }
    }

    pub fn velocity(&self, channel: u8, note: u8) -> Option<f64> {
        self.notes.get(&NoteKey { channel, note }).copied()
    }

    pub fn contains(&self, channel: u8, note: u8) -> bool {
        self.notes.contains_key(&NoteKey { channel, note })
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = HeldNote> + '_ {
        self.notes.iter().map(|(key, velocity)| HeldNote {
            channel: key.channel,
            note: key.note,
            velocity: *velocity,
        })
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

/// Shared handle on the active note set.
///
/// The decoder is the only writer. Readers either copy a snapshot or run a
/// closure under the read lock; both see one consistent state.
#[derive(Debug, Clone, Default)]
pub struct NoteTracker {
    inner: Arc<RwLock<ActiveNoteSet>>,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &MidiEvent) {
        self.inner.write().apply(event);
    }

    /// Read the set under the lock without copying it
    pub fn with_notes<R>(&self, f: impl FnOnce(&ActiveNoteSet) -> R) -> R {
        let guard = self.inner.read();
        f(&*guard)
    }

    /// Copy of all held notes, sorted by channel then note
    pub fn snapshot(&self) -> Vec<HeldNote> {
        let mut notes: Vec<HeldNote> = self.inner.read().iter().collect();
        notes.sort_by_key(|n| (n.channel, n.note));
        notes
    }

    pub fn velocity(&self, channel: u8, note: u8) -> Option<f64> {
        self.inner.read().velocity(channel, note)
    }

    pub fn held_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Drop every held note
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(bytes: [u8; 3]) -> MidiEvent {
        MidiEvent::decode(&bytes, "test", 0.0).unwrap()
    }

    #[test]
    fn test_note_on_then_off() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0x90, 60, 127]));
        assert_eq!(set.velocity(0, 60), Some(1.0));

        set.apply(&event([0x80, 60, 64]));
        assert!(!set.contains(0, 60));
        assert!(set.is_empty());
    }

    #[test]
    fn test_velocity_zero_releases() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0x92, 40, 90]));
        set.apply(&event([0x92, 40, 0]));
        assert!(!set.contains(2, 40));
    }

    #[test]
    fn test_note_off_for_absent_key_is_noop() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0x90, 10, 100]));
        assert!(!set.note_off(0, 11));
        assert!(!set.note_off(0, 11));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0x90, 60, 100]));
        set.apply(&event([0x91, 60, 50]));
        set.apply(&event([0x80, 60, 0]));
        assert!(!set.contains(0, 60));
        assert_eq!(set.velocity(1, 60), Some(50.0 / 127.0));
    }

    #[test]
    fn test_retrigger_overwrites_velocity() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0x90, 60, 127]));
        set.apply(&event([0x90, 60, 1]));
        assert_eq!(set.len(), 1);
        assert_eq!(set.velocity(0, 60), Some(1.0 / 127.0));
    }

    #[test]
    fn test_control_change_does_not_touch_notes() {
        let mut set = ActiveNoteSet::new();
        set.apply(&event([0xB0, 60, 127]));
        set.apply(&event([0xE0, 60, 127]));
        assert!(set.is_empty());
    }

    #[test]
    fn test_tracker_snapshot_is_sorted_copy() {
        let tracker = NoteTracker::new();
        tracker.apply(&event([0x91, 30, 127]));
        tracker.apply(&event([0x90, 72, 127]));
        tracker.apply(&event([0x90, 12, 127]));

        let snapshot = tracker.snapshot();
        let keys: Vec<(u8, u8)> = snapshot.iter().map(|n| (n.channel, n.note)).collect();
        assert_eq!(keys, vec![(0, 12), (0, 72), (1, 30)]);

        tracker.apply(&event([0x80, 12, 0]));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(tracker.held_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_note_on_sets_scaled_velocity(
            channel in 0u8..16,
            note in 0u8..128,
            velocity in 1u8..128,
        ) {
            let mut set = ActiveNoteSet::new();
            set.apply(&event([0x90 | channel, note, velocity]));
            prop_assert_eq!(set.velocity(channel, note), Some(f64::from(velocity) / 127.0));
        }

        #[test]
        fn prop_release_always_removes(
            channel in 0u8..16,
            note in 0u8..128,
            velocity in 0u8..128,
            release_with_zero_velocity in any::<bool>(),
        ) {
            let mut set = ActiveNoteSet::new();
            set.apply(&event([0x90 | channel, note, velocity]));
            let release = if release_with_zero_velocity {
                [0x90 | channel, note, 0]
            } else {
                [0x80 | channel, note, velocity]
            };
            set.apply(&event(release));
            prop_assert!(!set.contains(channel, note));
        }
    }
}
