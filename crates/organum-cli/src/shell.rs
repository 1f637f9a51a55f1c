//! Line-oriented console on stdin.
//!
//! Lines are parsed into a [`Command`] and run against the action facade;
//! errors of either kind are printed and the shell keeps going.

use crossbeam_channel::RecvTimeoutError;
use organum_core::actions::{KeyResult, StateView, StopInfo};
use organum_core::{ActionError, Actions, StateFilter};
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const HELP: &str = "\
Commands:
  on <STOP>                  Draw a stop (e.g. on GREAT_PRINCIPAL_8)
  off <STOP>                 Cancel a stop
  clear                      Cancel all stops
  panic                      Silence every output
  stops [division]           List stops
  active                     List drawn stops
  status                     Show organ status
  state [keys|notes]         Show held keys and sounding notes
  key <G|S|C|P> <note> <on|off>
                             Simulate a key
  help                       Show this help
  quit                       Shut down";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    On(String),
    Off(String),
    Clear,
    Panic,
    Stops(Option<String>),
    Active,
    Status,
    State(StateFilter),
    Key { manual: String, note: i64, down: bool },
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("on", [stop]) => Command::On(stop.to_string()),
        ("on", _) => return Err("Usage: on <STOP>".to_string()),
        ("off", [stop]) => Command::Off(stop.to_string()),
        ("off", _) => return Err("Usage: off <STOP>".to_string()),
        ("clear", []) => Command::Clear,
        ("panic", []) => Command::Panic,
        ("stops", []) => Command::Stops(None),
        ("stops", [division]) => Command::Stops(Some(division.to_string())),
        ("active", []) => Command::Active,
        ("status", []) => Command::Status,
        ("state", []) => Command::State(StateFilter::All),
        ("state", [filter]) => Command::State(filter.parse().map_err(|e: ActionError| e.to_string())?),
        ("key", [manual, note, action]) => {
            let note = note
                .parse::<i64>()
                .map_err(|_| format!("Invalid note: {}. Must be 0-127", note))?;
            let down = match action.to_ascii_lowercase().as_str() {
                "on" => true,
                "off" => false,
                other => return Err(format!("Invalid key action: {}. Use on/off", other)),
            };
            Command::Key {
                manual: manual.to_string(),
                note,
                down,
            }
        }
        ("key", _) => return Err("Usage: key <G|S|C|P> <note> <on|off>".to_string()),
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(format!("Unknown command: {}. Type 'help' for commands", other)),
    };
    Ok(Some(command))
}

fn stop_line(stop: &StopInfo) -> String {
    format!(
        "[{}] {:<24} {} ({})",
        if stop.active { "x" } else { " " },
        stop.id,
        stop.name,
        stop.division
    )
}

fn render_key(result: &KeyResult) -> String {
    match result.velocity {
        Some(velocity) => format!(
            "Key {} {} on (vel {}): {} notes",
            result.manual, result.note, velocity, result.commands
        ),
        None => format!("Key {} {} off: {} notes", result.manual, result.note, result.commands),
    }
}

fn render_state(view: &StateView) -> String {
    let mut out = String::new();
    if let Some(keys) = &view.keys {
        let _ = writeln!(out, "Held keys ({}):", keys.len());
        for key in keys {
            let _ = writeln!(out, "  {} {}", key.division.code(), key.note);
        }
    }
    if let Some(notes) = &view.notes {
        let _ = writeln!(out, "Sounding notes ({}):", notes.len());
        for note in notes {
            let _ = writeln!(
                out,
                "  {} ch={} note={} rank={} sources={}",
                note.output, note.channel, note.note, note.rank, note.sources
            );
        }
    }
    let _ = write!(out, "Active stops: {}", view.active_stops.join(", "));
    out
}

fn render<T>(result: Result<T, ActionError>, ok: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(payload) => ok(payload),
        Err(e) => format!("Error: {}", e),
    }
}

/// Run a command and render its result as text.
pub fn execute(actions: &Actions, command: &Command) -> String {
    match command {
        Command::On(stop) => render(actions.activate_stop(stop), |c| {
            if c.already_active {
                format!("{} ({}) is already active", c.stop_name, c.stop_id)
            } else {
                format!(
                    "Activated {} ({}), {} notes retriggered",
                    c.stop_name, c.division, c.notes
                )
            }
        }),
        Command::Off(stop) => render(actions.deactivate_stop(stop), |c| {
            format!("Deactivated {} ({}), {} notes silenced", c.stop_name, c.division, c.notes)
        }),
        Command::Clear => render(actions.all_clear(), |c| {
            if c.count == 0 {
                "No stops were active".to_string()
            } else {
                format!("Cleared {} stops: {}", c.count, c.stops.join(", "))
            }
        }),
        Command::Panic => render(actions.panic(), |p| {
            format!("PANIC: sent {} messages to {} outputs", p.messages, p.outputs_count)
        }),
        Command::Stops(division) => render(actions.list_stops(division.as_deref()), |list| {
            if list.stops.is_empty() {
                "No stops".to_string()
            } else {
                list.stops.iter().map(stop_line).collect::<Vec<_>>().join("\n")
            }
        }),
        Command::Active => render(actions.get_active_stops(), |list| {
            if list.stops.is_empty() {
                "No stops active".to_string()
            } else {
                format!("Active stops: {}", list.stops.join(", "))
            }
        }),
        Command::Status => render(actions.get_status(), |s| {
            let active: Vec<&str> = s.active_stops.iter().map(|stop| stop.id.as_str()).collect();
            format!(
                "Stops: {} ({} active: {})\nRanks: {}\nOutputs: {}\nHeld keys: {}\nSounding notes: {}",
                s.stop_count,
                active.len(),
                active.join(", "),
                s.rank_count,
                s.outputs.join(", "),
                s.active_keys,
                s.active_notes
            )
        }),
        Command::State(filter) => render(actions.get_state(*filter), |view| render_state(&view)),
        Command::Key { manual, note, down } => {
            render(actions.simulate_key(manual, *note, *down), |r| render_key(&r))
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "Bye".to_string(),
    }
}

fn prompt() {
    print!("organum> ");
    let _ = io::stdout().flush();
}

/// Read commands until `quit` or until `shutdown` is set.
///
/// `quit` sets `shutdown` itself. If stdin closes, the shell keeps the
/// process alive until a signal arrives.
pub fn run(actions: &Actions, shutdown: &AtomicBool) {
    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    let reader = thread::Builder::new()
        .name("organum-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = reader {
        log::error!("Failed to start shell: {}", e);
    }

    println!("Type 'help' for commands.");
    prompt();
    let mut interactive = true;
    while !shutdown.load(Ordering::SeqCst) {
        if !interactive {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => {
                        println!("{}", execute(actions, &Command::Quit));
                        shutdown.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(Some(command)) => println!("{}", execute(actions, &command)),
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
                prompt();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("stdin closed; running until interrupted");
                interactive = false;
            }
        }
    }
}
