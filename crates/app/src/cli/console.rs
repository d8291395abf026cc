//! Line commands for `soundboard run` and the listings shared with the
//! one-shot subcommands.

use soundboard_core::domain::{BindingState, OutputSlot, SessionSnapshot, TrackId};
use soundboard_infra::input::binding_name;

/// One parsed line of console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Play(TrackId),
    Bind(TrackId),
    BindStop,
    Cancel,
    Stop,
    Devices,
    Tracks,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "commands: play <id>, bind <id>, bind-stop, cancel, stop, devices, tracks, help, quit";

pub fn parse_line(line: &str) -> Result<Line, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Line::Empty);
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{}'", command));
    }

    let track = |argument: Option<&str>| {
        argument
            .map(TrackId::new)
            .ok_or_else(|| format!("'{}' needs a track id", command))
    };

    match (command, argument) {
        ("play" | "p", arg) => track(arg).map(Line::Play),
        ("bind" | "b", arg) => track(arg).map(Line::Bind),
        ("bind-stop", None) => Ok(Line::BindStop),
        ("cancel", None) => Ok(Line::Cancel),
        ("stop" | "s", None) => Ok(Line::Stop),
        ("devices", None) => Ok(Line::Devices),
        ("tracks", None) => Ok(Line::Tracks),
        ("help" | "?", None) => Ok(Line::Help),
        ("quit" | "exit" | "q", None) => Ok(Line::Quit),
        (_, Some(_)) if is_known(command) => Err(format!("'{}' takes no arguments", command)),
        _ => Err(format!("unknown command '{}'", command)),
    }
}

fn is_known(command: &str) -> bool {
    matches!(
        command,
        "bind-stop" | "cancel" | "stop" | "s" | "devices" | "tracks" | "help" | "?" | "quit" | "exit" | "q"
    )
}

pub fn print_devices(snapshot: &SessionSnapshot) {
    if snapshot.devices.is_empty() {
        println!("No output devices found");
        return;
    }

    for device in snapshot.devices.iter() {
        let slots: Vec<String> = OutputSlot::ALL
            .iter()
            .filter(|slot| snapshot.assignment.get(**slot) == Some(&device.id))
            .map(|slot| slot.to_string())
            .collect();
        let marker = if slots.is_empty() {
            String::new()
        } else {
            format!("  [{}]", slots.join(", "))
        };
        println!("{}{}", device.id, marker);
    }
}

pub fn print_tracks(snapshot: &SessionSnapshot) {
    if snapshot.tracks.is_empty() {
        println!("No tracks");
    }
    for track in &snapshot.tracks {
        println!("{}  {:<12} {}", track.id, binding_name(track.keycode), track.name);
    }
    println!("stop key: {}", binding_name(snapshot.stop_key));
}

/// Prompt shown while a rebind is waiting for a key
pub fn binding_prompt(state: &BindingState) -> Option<String> {
    match state {
        BindingState::Idle => None,
        BindingState::ListeningForTrackKey(track) => Some(format!(
            "Press a key for {} (Esc clears it)",
            track
        )),
        BindingState::ListeningForStopKey => {
            Some("Press a key to stop all sounds (Esc clears it)".to_string())
        }
    }
}
