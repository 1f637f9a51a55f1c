//! Error types for organum-core

use thiserror::Error;

use crate::catalog::Division;

/// Result type alias for organum-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading configuration or opening devices
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog consistency error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// MIDI backend error
    #[error("MIDI error: {0}")]
    Midi(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Inconsistencies detected while building the registration catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("rank '{0}' is defined more than once")]
    DuplicateRank(String),

    #[error("stop '{stop}' is defined more than once on {division}")]
    DuplicateStop { division: Division, stop: String },

    #[error("stop '{stop}' couples rank '{rank}' with velocity_min {min} > velocity_max {max}")]
    InvalidVelocityBounds {
        stop: String,
        rank: String,
        min: u8,
        max: u8,
    },

    #[error("stop '{stop}' transposes rank '{rank}' by {transpose}, outside -127..=127")]
    InvalidTranspose {
        stop: String,
        rank: String,
        transpose: i32,
    },

    #[error("rank '{rank}' has first_note {first} > last_note {last}")]
    InvalidNoteRange { rank: String, first: u8, last: u8 },

    #[error("invalid device address '{0}' (expected \"<label> <client>:<port>:<channel>\")")]
    InvalidAddress(String),

    #[error("no output configured for client:port '{0}'")]
    UnknownOutput(String),
}

/// Caller-facing failures of the action facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Unknown stop: {0}")]
    UnknownStop(String),

    #[error("Stop not active: {0}")]
    StopNotActive(String),

    #[error("Unknown division: {0}")]
    UnknownDivision(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Organ is shutting down")]
    ShuttingDown,
}

/// Failures reported by a [`NoteSink`](crate::output::NoteSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("no output named '{0}'")]
    UnknownOutput(String),

    #[error("send queue for output '{0}' is full")]
    QueueFull(String),

    #[error("output '{0}' is disconnected")]
    Disconnected(String),
}
