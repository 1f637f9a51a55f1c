//! Output boundary.
//!
//! The router emits [`OutputMessage`]s addressed to a named output through a
//! [`NoteSink`]. The sink decides how they reach a device: the native MIDI
//! transport, a log, or an in-memory recorder.

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::OutputError;

/// MIDI channel-mode controllers sent on panic.
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_RESET_ALL_CONTROLLERS: u8 = 121;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// A message sent to one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl OutputMessage {
    /// Convert to raw MIDI bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            OutputMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            OutputMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            OutputMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }
}

impl std::fmt::Display for OutputMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NOTE_ON ch={} note={} vel={}", channel, note, velocity),
            OutputMessage::NoteOff { channel, note } => {
                write!(f, "NOTE_OFF ch={} note={}", channel, note)
            }
            OutputMessage::ControlChange {
                channel,
                controller,
                value,
            } => write!(f, "CC ch={} cc={} val={}", channel, controller, value),
        }
    }
}

/// A message together with the output it was sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputCommand {
    pub output: String,
    pub message: OutputMessage,
}

/// Destination for routed notes.
///
/// `send` is called while the state lock is held and must not block.
pub trait NoteSink: Send + Sync {
    fn send(&self, output: &str, message: OutputMessage) -> Result<(), OutputError>;
}

/// Sink that only logs (dry run, no MIDI backend).
#[derive(Debug, Default)]
pub struct LogSink;

impl NoteSink for LogSink {
    fn send(&self, output: &str, message: OutputMessage) -> Result<(), OutputError> {
        log::debug!("[{}] {}", output, message);
        Ok(())
    }
}

/// Sink that records every command in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    commands: Mutex<Vec<OutputCommand>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<OutputCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

impl NoteSink for CollectingSink {
    fn send(&self, output: &str, message: OutputMessage) -> Result<(), OutputError> {
        self.commands.lock().push(OutputCommand {
            output: output.to_string(),
            message,
        });
        Ok(())
    }
}
