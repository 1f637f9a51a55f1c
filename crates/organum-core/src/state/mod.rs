//! Live state for organum.
//!
//! - [`OrganState`] - Drawn stops, held keys and sounding notes
//! - [`StateManager`] - Thread-safe, single-lock access to that state

mod manager;
mod model;

pub use manager::StateManager;
pub use model::{
    ActiveStops, HeldKeys, NoteSource, OrganState, SoundingKey, SoundingNote, SoundingNotes,
};
