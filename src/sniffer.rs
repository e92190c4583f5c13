//! MIDI monitor for debugging and development
//!
//! Prints every decoded event as it passes through the decoder, plus a
//! formatted port listing for `--list-ports`.

use chrono::{DateTime, Local};
use colored::*;

use reactive_mod::midi::{
    format_hex, ListenerId, MidiDecoder, MidiEvent, MidiEventKind, MidiInputDevice,
};

/// Register a listener that prints each event on its own line
pub fn attach_monitor(decoder: &MidiDecoder) -> ListenerId {
    println!("\n{}", "Monitoring MIDI traffic...".green());
    println!(
        "{}",
        "Format: [time] DEVICE | HEX => PARSED".dimmed()
    );
    println!("{}\n", "─".repeat(80).dimmed());

    decoder.subscribe(|event: &MidiEvent| {
        println!("{}", format_event(event, Local::now()));
    })
}

/// One monitor line, colored by event kind
pub fn format_event(event: &MidiEvent, at: DateTime<Local>) -> String {
    let device = if event.device_id.chars().count() > 20 {
        let head: String = event.device_id.chars().take(17).collect();
        format!("{}...", head)
    } else {
        event.device_id.clone()
    };

    let hex = format_hex(&event.encode());
    let hex = match event.kind {
        MidiEventKind::NoteOn => hex.bright_green(),
        MidiEventKind::NoteOff => hex.bright_red(),
        MidiEventKind::ControlChange => hex.bright_yellow(),
        MidiEventKind::PitchBend => hex.bright_cyan(),
    };

    format!(
        "[{}] {:20} | {} => {}",
        at.format("%H:%M:%S%.3f").to_string().dimmed(),
        device.white(),
        hex,
        event.to_string().bright_blue()
    )
}

/// List all input ports in a formatted way
pub fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Inputs ===".bold().cyan());

    match MidiInputDevice::list_ports() {
        Ok(ports) if ports.is_empty() => {
            println!("  {}", "No input ports found".dimmed());
        }
        Ok(ports) => {
            for port in ports {
                println!("  {} {}", format!("[{}]", port.index).green(), port.name);
            }
        }
        Err(e) => {
            println!("  {} {}", "MIDI unavailable:".red(), e);
        }
    }
    println!();
}
