//! MIDI input device adapter (midir)
//!
//! Finds an input port by case-insensitive substring, connects it and feeds
//! every packet straight into the decoder from the backend callback.

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::decoder::MidiDecoder;

const CLIENT_NAME: &str = "reactive-mod";

/// Device-layer failures. The core never sees these; callers report the
/// input as unavailable.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("MIDI backend unavailable: {0}")]
    Backend(#[from] midir::InitError),

    #[error("no MIDI input port matching '{0}'")]
    PortNotFound(String),

    #[error("failed to connect to MIDI input '{port}': {reason}")]
    Connect { port: String, reason: String },
}

/// Input port as listed for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MidiDeviceInfo {
    /// Position in the backend's port list
    pub index: usize,
    pub name: String,
}

/// One active input connection feeding a decoder
pub struct MidiInputDevice {
    decoder: Arc<MidiDecoder>,
    connection: Option<MidiInputConnection<()>>,
    active: Option<MidiDeviceInfo>,
}

impl MidiInputDevice {
    pub fn new(decoder: Arc<MidiDecoder>) -> Self {
        Self {
            decoder,
            connection: None,
            active: None,
        }
    }

    /// List available MIDI input ports
    pub fn list_ports() -> Result<Vec<MidiDeviceInfo>, DeviceError> {
        let midi_in = MidiInput::new(&format!("{}-scanner", CLIENT_NAME))?;
        Ok(midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiDeviceInfo { index, name })
            })
            .collect())
    }

    /// Find a port by index or case-insensitive substring
    fn find_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, MidiDeviceInfo)> {
        let needle = pattern.to_lowercase();
        let by_index = pattern.parse::<usize>().ok();

        midi_in
            .ports()
            .into_iter()
            .enumerate()
            .find_map(|(index, port)| {
                let name = midi_in.port_name(&port).ok()?;
                let matches = match by_index {
                    Some(i) => i == index,
                    None => name.to_lowercase().contains(&needle),
                };
                if matches {
                    debug!("Found port '{}' matching pattern '{}'", name, pattern);
                    Some((port, MidiDeviceInfo { index, name }))
                } else {
                    None
                }
            })
    }

    /// Connect to the first port matching `pattern`, replacing any current
    /// connection.
    pub fn select_input(&mut self, pattern: &str) -> Result<MidiDeviceInfo, DeviceError> {
        self.disconnect();

        let midi_in = MidiInput::new(CLIENT_NAME)?;
        let (port, info) = Self::find_port(&midi_in, pattern)
            .ok_or_else(|| DeviceError::PortNotFound(pattern.to_string()))?;

        info!("Connecting to MIDI input: {}", info.name);

        let decoder = self.decoder.clone();
        let device_id = info.name.clone();
        let connection = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |stamp_us, data, _| {
                    decoder.handle_packet(data, &device_id, stamp_us as f64 / 1000.0);
                },
                (),
            )
            .map_err(|e| DeviceError::Connect {
                port: info.name.clone(),
                reason: e.to_string(),
            })?;

        self.connection = Some(connection);
        self.active = Some(info.clone());
        self.decoder.set_active_device(Some(info.name.clone()));

        Ok(info)
    }

    /// Tear down the current connection, if any
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            if let Some(info) = self.active.take() {
                info!("Disconnected MIDI input: {}", info.name);
            }
            self.decoder.set_active_device(None);
        }
    }
}

impl Drop for MidiInputDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}
