//! MIDI transport.
//!
//! This module provides:
//! - Parsing of raw input bytes into [`MidiMessage`]
//! - Input port discovery and connection (via midir, `native` feature)
//! - [`MidiOutputs`], the [`NoteSink`] that drives the configured output ports
//!
//! Each output owns a dedicated sender thread fed by a bounded queue. Sends
//! from the router never block: a full queue drops the message and reports
//! [`OutputError::QueueFull`].

use std::collections::HashMap;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::OutputError;
use crate::output::{NoteSink, OutputMessage};

#[cfg(feature = "native")]
use crate::config::OutputSettings;
#[cfg(feature = "native")]
use crate::error::{Error, Result};
#[cfg(feature = "native")]
use crossbeam_channel::{unbounded, Receiver};
#[cfg(feature = "native")]
use midir::{MidiInput, MidiInputConnection, MidiOutput};

/// Note and controller messages parsed from raw MIDI input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
        timestamp: u64,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
        timestamp: u64,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
        timestamp: u64,
    },
}

impl MidiMessage {
    /// Parse raw MIDI bytes. Anything but note and controller messages is ignored.
    pub fn from_bytes(bytes: &[u8], timestamp: u64) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }

        let status = bytes[0];
        let channel = status & 0x0F;
        let (data1, data2) = (bytes[1] & 0x7F, bytes[2] & 0x7F);

        match status & 0xF0 {
            // Note on with velocity 0 is a note off
            0x90 if data2 == 0 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: 0,
                timestamp,
            }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
                timestamp,
            }),
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
                timestamp,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                controller: data1,
                value: data2,
                timestamp,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
                ..
            } => write!(f, "NOTE_ON ch={} note={} vel={}", channel, note, velocity),
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
                ..
            } => write!(f, "NOTE_OFF ch={} note={} vel={}", channel, note, velocity),
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
                ..
            } => write!(f, "CC ch={} cc={} val={}", channel, controller, value),
        }
    }
}

/// Information about a MIDI port.
#[derive(Debug, Clone)]
pub struct MidiDeviceInfo {
    /// Port name as reported by the system
    pub name: String,
    /// Port index (for opening)
    pub port_index: usize,
}

/// List available MIDI input ports.
#[cfg(feature = "native")]
pub fn list_input_ports(client_name: &str) -> Result<Vec<MidiDeviceInfo>> {
    let midi_in = MidiInput::new(&format!("{}-ports", client_name))
        .map_err(|e| Error::Midi(format!("Failed to create MIDI input: {}", e)))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiDeviceInfo {
            name: midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
            port_index: index,
        })
        .collect())
}

/// List available MIDI output ports.
#[cfg(feature = "native")]
pub fn list_output_ports(client_name: &str) -> Result<Vec<MidiDeviceInfo>> {
    let midi_out = MidiOutput::new(&format!("{}-ports", client_name))
        .map_err(|e| Error::Midi(format!("Failed to create MIDI output: {}", e)))?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiDeviceInfo {
            name: midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
            port_index: index,
        })
        .collect())
}

#[cfg(feature = "native")]
fn find_port(devices: Vec<MidiDeviceInfo>, pattern: &str) -> Option<MidiDeviceInfo> {
    let pattern = pattern.to_lowercase();
    devices
        .into_iter()
        .find(|d| d.name.to_lowercase().contains(&pattern))
}

/// MIDI input manager.
///
/// Keeps input connections alive and forwards parsed messages over a channel.
#[cfg(feature = "native")]
pub struct MidiInputManager {
    client_name: String,
    message_tx: crossbeam_channel::Sender<MidiMessage>,
    connections: Vec<MidiInputConnection<()>>,
}

#[cfg(feature = "native")]
impl MidiInputManager {
    /// Create a new input manager and the receiver its messages arrive on.
    pub fn new(client_name: &str) -> (Self, Receiver<MidiMessage>) {
        let (tx, rx) = unbounded();
        (
            Self {
                client_name: client_name.to_string(),
                message_tx: tx,
                connections: Vec::new(),
            },
            rx,
        )
    }

    /// Open an input port by name (partial match, case-insensitive).
    pub fn open_by_name(&mut self, name: &str) -> Result<MidiDeviceInfo> {
        let device = find_port(list_input_ports(&self.client_name)?, name)
            .ok_or_else(|| Error::Midi(format!("No MIDI input found matching '{}'", name)))?;
        self.open_by_index(device.port_index)
    }

    /// Open an input port by index.
    pub fn open_by_index(&mut self, port_index: usize) -> Result<MidiDeviceInfo> {
        let midi_in = MidiInput::new(&self.client_name)
            .map_err(|e| Error::Midi(format!("Failed to create MIDI input: {}", e)))?;

        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| Error::Midi(format!("Invalid MIDI port index: {}", port_index)))?;
        let name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown Device {}", port_index));

        let tx = self.message_tx.clone();
        let connection = midi_in
            .connect(
                port,
                &format!("{}-input", self.client_name),
                move |timestamp, bytes, _| {
                    if let Some(msg) = MidiMessage::from_bytes(bytes, timestamp) {
                        log::debug!("[MIDI IN] {}", msg);
                        let _ = tx.send(msg);
                    }
                },
                (),
            )
            .map_err(|e| Error::Midi(format!("Failed to connect to MIDI input: {}", e)))?;

        let device = MidiDeviceInfo { name, port_index };
        self.connections.push(connection);
        log::info!("Connected to MIDI input: {} (port {})", device.name, port_index);
        Ok(device)
    }

    pub fn close_all(&mut self) {
        self.connections.clear();
    }
}

enum PortCommand {
    Send([u8; 3]),
    Shutdown,
}

/// The configured output ports, one sender thread each.
pub struct MidiOutputs {
    ports: HashMap<String, Sender<PortCommand>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl MidiOutputs {
    /// Open every configured output. Any port that cannot be opened is an error.
    #[cfg(feature = "native")]
    pub fn open(client_name: &str, outputs: &[OutputSettings], capacity: usize) -> Result<Self> {
        let mut this = Self::empty();
        for settings in outputs {
            if this.ports.contains_key(&settings.name) {
                continue;
            }
            let device = find_port(list_output_ports(client_name)?, settings.port_pattern())
                .ok_or_else(|| {
                    Error::Midi(format!(
                        "No MIDI output found matching '{}' for output '{}'",
                        settings.port_pattern(),
                        settings.name
                    ))
                })?;

            let midi_out = MidiOutput::new(client_name)
                .map_err(|e| Error::Midi(format!("Failed to create MIDI output: {}", e)))?;
            let ports = midi_out.ports();
            let port = ports.get(device.port_index).ok_or_else(|| {
                Error::Midi(format!("MIDI output '{}' disappeared", device.name))
            })?;
            let mut connection = midi_out
                .connect(port, &format!("{}-{}", client_name, settings.name))
                .map_err(|e| {
                    Error::Midi(format!("Failed to connect to MIDI output '{}': {}", device.name, e))
                })?;
            log::info!("Output '{}' connected to {}", settings.name, device.name);

            let name = settings.name.clone();
            this.spawn_port(&settings.name, capacity, move |bytes| {
                if let Err(e) = connection.send(bytes) {
                    log::error!("MIDI send to '{}' failed: {}", name, e);
                }
            })?;
        }
        Ok(this)
    }

    fn empty() -> Self {
        Self {
            ports: HashMap::new(),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Start the sender thread for one output. `write` runs on that thread only.
    fn spawn_port<W>(&mut self, name: &str, capacity: usize, mut write: W) -> std::io::Result<()>
    where
        W: FnMut(&[u8]) + Send + 'static,
    {
        let (tx, rx) = bounded::<PortCommand>(capacity.max(1));
        let handle = thread::Builder::new()
            .name(format!("midi-out-{}", name))
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        PortCommand::Send(bytes) => write(&bytes),
                        PortCommand::Shutdown => break,
                    }
                }
            })?;
        self.ports.insert(name.to_string(), tx);
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Names of the opened outputs.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop all sender threads after they drain what is queued.
    pub fn shutdown(&self) {
        for (name, tx) in &self.ports {
            if tx.send_timeout(PortCommand::Shutdown, Duration::from_secs(1)).is_err() {
                log::warn!("Output '{}' did not accept shutdown", name);
            }
        }
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl NoteSink for MidiOutputs {
    fn send(&self, output: &str, message: OutputMessage) -> std::result::Result<(), OutputError> {
        let tx = self
            .ports
            .get(output)
            .ok_or_else(|| OutputError::UnknownOutput(output.to_string()))?;
        tx.try_send(PortCommand::Send(message.to_bytes()))
            .map_err(|e| match e {
                TrySendError::Full(_) => OutputError::QueueFull(output.to_string()),
                TrySendError::Disconnected(_) => OutputError::Disconnected(output.to_string()),
            })
    }
}

impl fmt::Debug for MidiOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiOutputs")
            .field("ports", &self.names())
            .finish_non_exhaustive()
    }
}
