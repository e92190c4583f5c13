//! Packet intake: decode, track notes, dispatch
//!
//! Every packet is handled to completion on the caller's thread (the MIDI
//! backend callback): the note tracker is updated, Control Change goes to
//! the mapping engine, then every listener sees the event. Nothing is
//! queued, so the next frame always reads the latest note state.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, trace};

use super::notes::NoteTracker;
use super::{format_hex, MidiEvent, MidiEventKind};
use crate::mapping::MappingEngine;

/// Handle returned by [`MidiDecoder::subscribe`]
pub type ListenerId = usize;

type ListenerFn = Arc<dyn Fn(&MidiEvent) + Send + Sync>;

pub struct MidiDecoder {
    notes: NoteTracker,
    mapper: MappingEngine,
    listeners: RwLock<Vec<(ListenerId, ListenerFn)>>,
    next_listener: AtomicUsize,
    active_device: RwLock<Option<String>>,
}

impl MidiDecoder {
    pub fn new(notes: NoteTracker, mapper: MappingEngine) -> Self {
        Self {
            notes,
            mapper,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicUsize::new(0),
            active_device: RwLock::new(None),
        }
    }

    /// Decode and dispatch one raw packet.
    ///
    /// Returns the decoded event, or `None` when the packet was filtered.
    pub fn handle_packet(&self, data: &[u8], device_id: &str, timestamp: f64) -> Option<MidiEvent> {
        let Some(event) = MidiEvent::decode(data, device_id, timestamp) else {
            trace!("Filtered MIDI packet: {}", format_hex(data));
            return None;
        };
        trace!("MIDI in [{}] {}", device_id, event);

        match event.kind {
            MidiEventKind::NoteOn | MidiEventKind::NoteOff => self.notes.apply(&event),
            MidiEventKind::ControlChange => self.mapper.process_control_change(&event),
            MidiEventKind::PitchBend => {}
        }

        // Copy the list so a listener may (un)subscribe from inside its callback
        let listeners: Vec<ListenerFn> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }

        Some(event)
    }

    /// Register a listener for every decoded event
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MidiEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Record a device switch.
    ///
    /// Held notes are left as they are: a note held on the old device stays
    /// held until a matching release arrives.
    pub fn set_active_device(&self, device_id: Option<String>) {
        let mut active = self.active_device.write();
        if *active != device_id {
            info!(
                "Active MIDI device: {} (held notes kept: {})",
                device_id.as_deref().unwrap_or("none"),
                self.notes.held_count()
            );
        }
        *active = device_id;
    }

    pub fn active_device(&self) -> Option<String> {
        self.active_device.read().clone()
    }

    pub fn notes(&self) -> &NoteTracker {
        &self.notes
    }
}
