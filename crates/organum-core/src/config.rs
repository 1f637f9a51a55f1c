//! Configuration file support for organum
//!
//! The whole instrument is described by one TOML file, stored by default at:
//! - Linux: `~/.config/organum/organ.toml`
//! - macOS: `~/Library/Application Support/organum/organ.toml`
//! - Windows: `%APPDATA%\organum\organ.toml`
//!
//! Parsing is purely structural. Cross-references (ranks named by stops,
//! outputs named by rank addresses, stops named by the stop board) are checked
//! when the [`Catalog`](crate::catalog::Catalog) and
//! [`InputMap`](crate::input::InputMap) are built.

use crate::catalog::Division;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default velocity used when replaying held keys through a newly drawn stop.
pub const DEFAULT_RETRIGGER_VELOCITY: u8 = 64;

/// Default capacity of each output's send queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganConfig {
    /// MIDI transport settings
    pub midi: MidiSettings,
    /// HTTP API settings
    pub http: HttpSettings,
    /// Routing behaviour
    pub routing: RoutingSettings,
    /// Output devices, addressed by rank addresses through `client_port`
    pub outputs: Vec<OutputSettings>,
    /// Sounding ranks
    pub ranks: Vec<RankSettings>,
    /// Stops, in declaration order
    pub stops: Vec<StopSettings>,
    /// Input channel map
    pub input: InputSettings,
}

impl OrganConfig {
    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!("Config file not found at {:?}", path)));
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded configuration from {:?}: {} ranks, {} stops, {} outputs",
            path,
            config.ranks.len(),
            config.stops.len(),
            config.outputs.len()
        );
        Ok(config)
    }

    /// Load configuration from the default config file location
    pub fn load_default() -> Result<Self> {
        Self::load(Self::config_path()?)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "organum") {
            Ok(proj_dirs.config_dir().join("organ.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Write a commented example configuration to `path`.
    pub fn create_example_file(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, EXAMPLE_CONFIG)?;
        Ok(path.to_path_buf())
    }
}

/// MIDI transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Client name announced to the MIDI system
    pub client_name: String,
    /// Case-insensitive substring of the input port to open
    pub input_port: Option<String>,
    /// Capacity of each output's bounded send queue
    pub queue_capacity: usize,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            client_name: "organum".to_string(),
            input_port: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// How notes reached through more than one stop or division are released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedNotePolicy {
    /// Release a sounding note only when nothing else still holds it.
    #[default]
    Preserve,
    /// Every computed note-on/note-off is sent; the last writer owns the entry.
    Independent,
}

/// Routing behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Velocity used when held keys are replayed through a newly drawn stop
    pub retrigger_velocity: u8,
    /// Release policy for notes shared between stops or divisions
    pub shared_notes: SharedNotePolicy,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            retrigger_velocity: DEFAULT_RETRIGGER_VELOCITY,
            shared_notes: SharedNotePolicy::default(),
        }
    }
}

/// One output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Output name used in logs and state snapshots
    pub name: String,
    /// `client:port` as it appears in rank addresses (e.g. `"20:2"`)
    pub client_port: String,
    /// Substring used to find the device port; defaults to `client_port`
    #[serde(default)]
    pub port: Option<String>,
}

impl OutputSettings {
    /// The pattern used to open this output's port.
    pub fn port_pattern(&self) -> &str {
        self.port.as_deref().unwrap_or(&self.client_port)
    }
}

/// One rank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSettings {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Rank-native note number sounding middle C
    #[serde(default, alias = "c4_pitch_note")]
    pub pitch_reference: Option<u8>,
    #[serde(default)]
    pub first_note: Option<u8>,
    #[serde(default)]
    pub last_note: Option<u8>,
    /// `"<device-label> <client>:<port>:<channel>"`
    #[serde(default, alias = "midi_address")]
    pub address: String,
}

/// One stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSettings {
    pub division: Division,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ranks: Vec<CouplingSettings>,
}

/// A stop's coupling to one rank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingSettings {
    pub rank: String,
    #[serde(default)]
    pub transpose: i32,
    #[serde(default = "default_velocity_min")]
    pub velocity_min: u8,
    #[serde(default = "default_velocity_max")]
    pub velocity_max: u8,
}

fn default_velocity_min() -> u8 {
    1
}

fn default_velocity_max() -> u8 {
    127
}

/// Input channel map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Manual and pedal keyboards
    pub manuals: Vec<ManualSettings>,
    /// The stop board, if any
    pub stops: Option<StopBoardSettings>,
}

/// One keyboard (manual or pedalboard) on the input side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSettings {
    pub division: Division,
    pub channel: u8,
    pub first_note: u8,
    pub last_note: u8,
}

/// The stop board: a channel whose notes draw and cancel stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopBoardSettings {
    pub channel: u8,
    #[serde(default)]
    pub mappings: Vec<StopMappingSettings>,
}

/// One stop-board note → `"division:STOP_ID"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopMappingSettings {
    pub note: u8,
    pub stop: String,
}

const EXAMPLE_CONFIG: &str = r#"# organum configuration file

[midi]
# Client name announced to ALSA/CoreMIDI
client_name = "organum"

# Case-insensitive substring of the input port carrying keyboards and stop board
# input_port = "U6MIDI Pro MIDI 1"

# Per-output send queue; a full queue drops notes instead of stalling routing
queue_capacity = 1024

[http]
enabled = true
host = "0.0.0.0"
port = 5000

[routing]
# Velocity used when held keys are replayed through a newly drawn stop
retrigger_velocity = 64

# "preserve": a note shared by several stops sounds until the last one lets go
# "independent": every stop sends its own note-offs
shared_notes = "preserve"

[[outputs]]
name = "pipes"
client_port = "20:2"
# port = "U6MIDI Pro MIDI 3"

[[ranks]]
id = "principal_8"
name = "Principal 8'"
pitch_reference = 60
first_note = 36
last_note = 96
address = "U6MIDI Pro:U6MIDI Pro MIDI 3 20:2:0"

[[ranks]]
id = "octave_4"
name = "Octave 4'"
pitch_reference = 60
first_note = 36
last_note = 108
address = "U6MIDI Pro:U6MIDI Pro MIDI 3 20:2:1"

[[stops]]
division = "great"
id = "GREAT_PRINCIPAL_8"
name = "Principal 8'"
ranks = [{ rank = "principal_8" }]

[[stops]]
division = "great"
id = "GREAT_OCTAVE_4"
name = "Octave 4'"
ranks = [{ rank = "octave_4", transpose = 12 }]

[[stops]]
division = "pedal"
id = "PEDAL_PRINCIPAL_16"
name = "Principal 16'"
ranks = [{ rank = "principal_8", transpose = -12, velocity_min = 100, velocity_max = 100 }]

[[input.manuals]]
division = "great"
channel = 0
first_note = 36
last_note = 96

[[input.manuals]]
division = "pedal"
channel = 3
first_note = 36
last_note = 67

[input.stops]
channel = 15
mappings = [
    { note = 0, stop = "great:GREAT_PRINCIPAL_8" },
    { note = 1, stop = "great:GREAT_OCTAVE_4" },
    { note = 2, stop = "pedal:PEDAL_PRINCIPAL_16" },
]
"#;
