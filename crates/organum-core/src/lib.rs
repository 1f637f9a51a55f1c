//! Organum Core - Stop routing and state management for a MIDI pipe organ.
//!
//! This crate provides the engine between the console (manuals, pedalboard,
//! stop board) and the sounding ranks:
//!
//! - **Catalog** - Divisions, ranks, stops and their rank couplings
//! - **Pitch** - Played note to rank-native note mapping
//! - **State** - Drawn stops, held keys and sounding notes behind one lock
//! - **Router** - Fan-out of key events through drawn stops, with deduplication
//! - **Stops** - Draw/cancel transitions with retrigger and silence of held keys
//! - **Input** - Classification of raw channel/note events
//! - **Actions** - The command surface shared by the shell and the HTTP API
//! - **MIDI** - Input parsing and per-output sender threads
//!
//! # Architecture
//!
//! [`Organ`] is the context object. It is cheap to clone and shared by the
//! input worker, the interactive shell and the HTTP server; all three go
//! through the same [`StateManager`] lock, so a stop toggle and a key event
//! are never interleaved mid-computation.
//!
//! # Feature Flags
//!
//! - `native` (default) - Real MIDI ports through midir

pub mod actions;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod midi;
pub mod output;
pub mod pitch;
pub mod router;
pub mod runtime;
pub mod state;
pub mod stops;

pub use actions::{ActionResponse, Actions, StateFilter};
pub use catalog::{Catalog, Coupling, Division, OutputAddress, Rank, Stop, StopId};
pub use config::{OrganConfig, SharedNotePolicy};
pub use engine::Organ;
pub use error::{ActionError, CatalogError, Error, OutputError, Result};
pub use input::{InputEvent, InputMap};
pub use midi::{MidiMessage, MidiOutputs};
pub use output::{CollectingSink, LogSink, NoteSink, OutputCommand, OutputMessage};
pub use router::Router;
pub use runtime::InputWorker;
pub use state::{OrganState, StateManager};
pub use stops::{Activation, Deactivation, StopRegistry};

#[cfg(feature = "native")]
pub use midi::{list_input_ports, list_output_ports, MidiInputManager};
