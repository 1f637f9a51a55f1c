//! Pitch mapping from played notes to rank-native notes.
//!
//! Both functions are total. A computed note may be negative or above 127;
//! the router discards those after the range check.

use crate::catalog::Rank;

/// Conventional middle-C note number the catalog's pitch references are relative to.
pub const MIDDLE_C: i32 = 60;

/// `played + transpose + (pitch_reference - 60)`
pub fn map_note(played: u8, transpose: i32, pitch_reference: u8) -> i32 {
    played as i32 + transpose + (pitch_reference as i32 - MIDDLE_C)
}

/// True iff `note` lies inside the rank's (possibly open-ended) playable range.
pub fn in_range(note: i32, rank: &Rank) -> bool {
    rank.first_note.map_or(true, |first| note >= first as i32)
        && rank.last_note.map_or(true, |last| note <= last as i32)
}

/// Narrow a computed note to a MIDI note number, if it is one.
pub fn to_midi_note(note: i32) -> Option<u8> {
    u8::try_from(note).ok().filter(|n| *n <= 127)
}
