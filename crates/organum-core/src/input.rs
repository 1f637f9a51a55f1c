//! Input mapper.
//!
//! Classifies raw note events from the console by channel: manual and pedal
//! channels produce key events, the stop-board channel produces stop draw and
//! cancel events, everything else (pistons, unknown channels) is discarded.

use std::collections::HashMap;

use crate::catalog::{Catalog, Division, StopId};
use crate::config::InputSettings;
use crate::error::CatalogError;

/// A classified input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown { division: Division, note: u8, velocity: u8 },
    KeyUp { division: Division, note: u8 },
    StopDraw(StopId),
    StopCancel(StopId),
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Manual {
    division: Division,
    first_note: u8,
    last_note: u8,
}

/// Static channel table built from the input configuration.
#[derive(Debug, Clone, Default)]
pub struct InputMap {
    manuals: HashMap<u8, Manual>,
    stop_channel: Option<u8>,
    stop_notes: HashMap<u8, StopId>,
}

impl InputMap {
    /// Build the table, checking that every stop-board mapping names a stop
    /// in the catalog.
    pub fn from_config(input: &InputSettings, catalog: &Catalog) -> Result<Self, CatalogError> {
        let mut manuals = HashMap::new();
        for manual in &input.manuals {
            if manual.first_note > manual.last_note {
                return Err(CatalogError::InvalidNoteRange {
                    rank: format!("{} manual", manual.division),
                    first: manual.first_note,
                    last: manual.last_note,
                });
            }
            if manuals
                .insert(
                    manual.channel,
                    Manual {
                        division: manual.division,
                        first_note: manual.first_note,
                        last_note: manual.last_note,
                    },
                )
                .is_some()
            {
                log::warn!("Input channel {} is mapped more than once, last one wins", manual.channel);
            }
            log::info!(
                "Input channel {} -> {} [{}..={}]",
                manual.channel,
                manual.division,
                manual.first_note,
                manual.last_note
            );
        }

        let mut stop_channel = None;
        let mut stop_notes = HashMap::new();
        if let Some(board) = &input.stops {
            stop_channel = Some(board.channel);
            for mapping in &board.mappings {
                match catalog.resolve(&mapping.stop) {
                    Some(stop) => {
                        stop_notes.insert(mapping.note, stop.id.clone());
                    }
                    None => log::warn!(
                        "Stop board note {} names unknown stop '{}', ignoring",
                        mapping.note,
                        mapping.stop
                    ),
                }
            }
            log::info!("Stop board on channel {}: {} stops mapped", board.channel, stop_notes.len());
        }

        Ok(Self {
            manuals,
            stop_channel,
            stop_notes,
        })
    }

    /// Classify one note event. A note-on with velocity 0 counts as a release.
    pub fn classify(&self, channel: u8, note: u8, velocity: u8, is_note_on: bool) -> InputEvent {
        let pressed = is_note_on && velocity > 0;

        if let Some(manual) = self.manuals.get(&channel) {
            if note < manual.first_note || note > manual.last_note {
                log::debug!("Ignoring piston on {}: note {}", manual.division, note);
                return InputEvent::Other;
            }
            return if pressed {
                InputEvent::KeyDown {
                    division: manual.division,
                    note,
                    velocity,
                }
            } else {
                InputEvent::KeyUp {
                    division: manual.division,
                    note,
                }
            };
        }

        if self.stop_channel == Some(channel) {
            return match self.stop_notes.get(&note) {
                Some(id) if pressed => InputEvent::StopDraw(id.clone()),
                Some(id) => InputEvent::StopCancel(id.clone()),
                None => {
                    log::debug!("Unmapped stop board note {}", note);
                    InputEvent::Other
                }
            };
        }

        log::debug!("Ignoring event on unmapped channel {}", channel);
        InputEvent::Other
    }

    pub fn is_empty(&self) -> bool {
        self.manuals.is_empty() && self.stop_notes.is_empty()
    }
}
