//! Command-line interface and REPL
//!
//! Arms MIDI learn, inspects mappings and registers, and switches input
//! mode while the frame loop keeps running.

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fmt::Write as _;

use reactive_mod::mapping::TargetKind;
use reactive_mod::modulation::{Envelope, EnvelopeUpdate, Lfo};
use reactive_mod::{InputMode, Session};

const HELP: &str = "\
learn <layer|lfo> <id> <param>   arm MIDI learn, then move a knob
cancel                           cancel MIDI learn
mappings                         list mappings
unmap <mapping-id>               delete a mapping
mode [midi|audio|mix]            show or set the input mode
notes                            list held notes
clear-notes                      release every held note
device                           show the active MIDI input
intensity [reactivity]           current intensity reading
lfo <id> [time]                  evaluate one LFO
lfos                             list LFOs
add-lfo                          add an LFO with default settings
env <id> <now> <trigger> [release]  evaluate an envelope
env-set <id> <a> <d> <s> <r>     set envelope attack, decay, sustain, release
layers                           list layers
quit                             exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Learn {
        kind: TargetKind,
        id: String,
        param: String,
    },
    Cancel,
    Mappings,
    Unmap(String),
    Mode(Option<InputMode>),
    Notes,
    ClearNotes,
    Device,
    Intensity(Option<f64>),
    Lfo { id: String, time: Option<f64> },
    Lfos,
    AddLfo,
    Envelope {
        id: String,
        now: f64,
        trigger: f64,
        release: Option<f64>,
    },
    SetEnvelope {
        id: String,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
    },
    Layers,
    Help,
    Quit,
}

pub enum Outcome {
    Print(String),
    Quit,
}

fn number(word: Option<&str>, what: &str) -> Result<f64> {
    let word = word.ok_or_else(|| anyhow!("missing {}", what))?;
    word.parse()
        .with_context(|| format!("{} must be a number, got '{}'", what, word))
}

fn optional_number(word: Option<&str>, what: &str) -> Result<Option<f64>> {
    word.map(|w| number(Some(w), what)).transpose()
}

/// Parse one REPL line. Empty lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_lowercase().as_str() {
        "learn" => {
            let (Some(kind), Some(id), Some(param)) = (words.next(), words.next(), words.next())
            else {
                bail!("usage: learn <layer|lfo> <id> <param>");
            };
            Command::Learn {
                kind: kind.parse()?,
                id: id.to_string(),
                param: param.to_string(),
            }
        }
        "cancel" => Command::Cancel,
        "mappings" => Command::Mappings,
        "unmap" => Command::Unmap(
            words
                .next()
                .ok_or_else(|| anyhow!("usage: unmap <mapping-id>"))?
                .to_string(),
        ),
        "mode" => Command::Mode(words.next().map(str::parse::<InputMode>).transpose()?),
        "notes" => Command::Notes,
        "clear-notes" => Command::ClearNotes,
        "device" => Command::Device,
        "intensity" => Command::Intensity(optional_number(words.next(), "reactivity")?),
        "lfo" => Command::Lfo {
            id: words
                .next()
                .ok_or_else(|| anyhow!("usage: lfo <id> [time]"))?
                .to_string(),
            time: optional_number(words.next(), "time")?,
        },
        "lfos" => Command::Lfos,
        "add-lfo" => Command::AddLfo,
        "env" => {
            let id = words
                .next()
                .ok_or_else(|| anyhow!("usage: env <id> <now> <trigger> [release]"))?
                .to_string();
            Command::Envelope {
                id,
                now: number(words.next(), "now")?,
                trigger: number(words.next(), "trigger")?,
                release: optional_number(words.next(), "release")?,
            }
        }
        "env-set" => {
            let id = words
                .next()
                .ok_or_else(|| anyhow!("usage: env-set <id> <attack> <decay> <sustain> <release>"))?
                .to_string();
            Command::SetEnvelope {
                id,
                attack: number(words.next(), "attack")?,
                decay: number(words.next(), "decay")?,
                sustain: number(words.next(), "sustain")?,
                release: number(words.next(), "release")?,
            }
        }
        "layers" => Command::Layers,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}' (try 'help')", other),
    };

    Ok(Some(command))
}

/// Run one command against the session
pub fn execute(session: &Session, command: Command) -> Result<Outcome> {
    let mut out = String::new();

    match command {
        Command::Learn { kind, id, param } => {
            let state = session.mapper().arm_learning(kind, &id, &param);
            if state.is_active {
                write!(out, "🎛️  Move a control to bind {} {}.{}", kind, id, param)?;
            } else {
                bail!("learn needs a target id and parameter");
            }
        }
        Command::Cancel => {
            session.mapper().cancel_learning();
            write!(out, "Learning cancelled")?;
        }
        Command::Mappings => {
            let mappings = session.mapper().mappings();
            if mappings.is_empty() {
                write!(out, "{}", "No mappings".dimmed())?;
            }
            for (i, mapping) in mappings.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write!(
                    out,
                    "{} ch:{} cc:{} → {}",
                    mapping.id.yellow(),
                    mapping.source.channel + 1,
                    mapping.source.cc,
                    mapping.target
                )?;
            }
        }
        Command::Unmap(id) => {
            if !session.mapper().remove_mapping(&id) {
                bail!("no mapping '{}'", id);
            }
            write!(out, "Removed {}", id)?;
        }
        Command::Mode(Some(mode)) => {
            session.aggregator().set_mode(mode);
            write!(out, "Input mode: {}", mode.to_string().green())?;
        }
        Command::Mode(None) => {
            write!(out, "Input mode: {}", session.aggregator().mode().to_string().green())?;
        }
        Command::Notes => {
            let held = session.notes().snapshot();
            if held.is_empty() {
                write!(out, "{}", "No notes held".dimmed())?;
            }
            for (i, note) in held.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write!(
                    out,
                    "ch:{} n:{} vel:{:.3}",
                    note.channel + 1,
                    note.note,
                    note.velocity
                )?;
            }
        }
        Command::ClearNotes => {
            let released = session.notes().held_count();
            session.notes().clear();
            write!(out, "Released {} note(s)", released)?;
        }
        Command::Device => {
            let device = session.decoder().active_device();
            write!(out, "MIDI input: {}", device.as_deref().unwrap_or("none"))?;
        }
        Command::Intensity(reactivity) => {
            let reading = session
                .aggregator()
                .intensity(reactivity.unwrap_or_else(|| session.reactivity()));
            write!(
                out,
                "intensity {:.3}  bass {:.3}  mid {:.3}  treble {:.3}",
                reading.intensity, reading.bass, reading.mid, reading.treble
            )?;
        }
        Command::Lfo { id, time } => {
            let lfo = session
                .store()
                .lfos()
                .into_iter()
                .find(|lfo| lfo.id == id)
                .ok_or_else(|| anyhow!("no LFO '{}'", id))?;
            let time = time.unwrap_or_else(|| session.elapsed());
            write!(out, "{} @ {:.3}s = {:.4}", lfo.id.cyan(), time, Lfo::evaluate(&lfo, time))?;
        }
        Command::Lfos => {
            for (i, lfo) in session.store().lfos().iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write!(
                    out,
                    "{} {} {} {:.2} Hz depth {:.2}{}",
                    lfo.id.cyan(),
                    lfo.name,
                    lfo.shape,
                    lfo.rate,
                    lfo.depth,
                    if lfo.enabled { "" } else { " (disabled)" }
                )?;
            }
        }
        Command::AddLfo => {
            let lfo = session.store().add_lfo();
            write!(out, "Added {} ({})", lfo.id.cyan(), lfo.name)?;
        }
        Command::Envelope {
            id,
            now,
            trigger,
            release,
        } => {
            let envelope = session
                .store()
                .envelope(&id)
                .ok_or_else(|| anyhow!("no envelope '{}'", id))?;
            write!(
                out,
                "{} {:?} {:.4}",
                envelope.id.cyan(),
                Envelope::phase(&envelope, now, trigger, release),
                Envelope::evaluate(&envelope, now, trigger, release)
            )?;
        }
        Command::SetEnvelope {
            id,
            attack,
            decay,
            sustain,
            release,
        } => {
            for (stage, seconds) in [("attack", attack), ("decay", decay), ("release", release)] {
                if !(seconds >= 0.0 && seconds.is_finite()) {
                    bail!("{} must be >= 0 seconds, got {}", stage, seconds);
                }
            }
            if !(0.0..=1.0).contains(&sustain) {
                bail!("sustain must be 0-1, got {}", sustain);
            }
            let update = EnvelopeUpdate {
                attack: Some(attack),
                decay: Some(decay),
                sustain: Some(sustain),
                release: Some(release),
                ..Default::default()
            };
            if !session.store().update_envelope(&id, update) {
                bail!("no envelope '{}'", id);
            }
            write!(
                out,
                "{} A {:.3}s D {:.3}s S {:.2} R {:.3}s",
                id.cyan(),
                attack,
                decay,
                sustain,
                release
            )?;
        }
        Command::Layers => {
            for (i, layer) in session.store().layers().iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write!(
                    out,
                    "{} {} opacity {:.2} reactivity {:.2}{}",
                    layer.id.cyan(),
                    layer.name,
                    layer.opacity,
                    layer.reactivity,
                    layer
                        .param_f64("count")
                        .map(|count| format!(" count {}", count))
                        .unwrap_or_default()
                )?;
            }
        }
        Command::Help => out.push_str(HELP),
        Command::Quit => return Ok(Outcome::Quit),
    }

    Ok(Outcome::Print(out))
}

/// Blocking REPL loop; returns on `quit`, Ctrl+C or Ctrl+D
pub fn run_repl(session: &Session) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("reactive> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{} {:#}", "error:".red(), e);
                        continue;
                    }
                };
                match execute(session, command) {
                    Ok(Outcome::Print(text)) if !text.is_empty() => println!("{}", text),
                    Ok(Outcome::Print(_)) => {}
                    Ok(Outcome::Quit) => break,
                    Err(e) => println!("{} {:#}", "error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
