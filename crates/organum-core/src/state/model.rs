//! Live state of the instrument.
//!
//! Three sets make up the mutable state: the drawn stops, the held keys and
//! the notes currently commanded on at the output boundary. They are only
//! ever mutated together under the [`StateManager`](super::StateManager) lock.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use crate::catalog::{Division, StopId};

/// Complete mutable state of the organ.
#[derive(Clone, Debug, Default)]
pub struct OrganState {
    /// Drawn stops, keyed by catalog ordinal.
    pub active_stops: ActiveStops,
    /// Physically held keys.
    pub keys: HeldKeys,
    /// Notes commanded on at the outputs.
    pub sounding: SoundingNotes,
    /// Bumped on every mutation.
    pub version: u64,
    /// Set when the organ is silenced for shutdown. Nothing is routed after that.
    pub closed: bool,
}

impl OrganState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// The set of drawn stops.
///
/// Keyed by the stop's position in the catalog so that iteration follows
/// declaration order.
#[derive(Clone, Debug, Default)]
pub struct ActiveStops {
    stops: BTreeMap<usize, StopId>,
}

impl ActiveStops {
    /// Insert a stop. Returns false if it was already drawn.
    pub fn insert(&mut self, ordinal: usize, id: StopId) -> bool {
        if self.stops.contains_key(&ordinal) {
            return false;
        }
        self.stops.insert(ordinal, id);
        true
    }

    /// Remove a stop. Returns false if it was not drawn.
    pub fn remove(&mut self, ordinal: usize) -> bool {
        self.stops.remove(&ordinal).is_some()
    }

    pub fn contains(&self, ordinal: usize) -> bool {
        self.stops.contains_key(&ordinal)
    }

    /// Ordinals of the stops drawn on `division`, in declaration order.
    pub fn ordinals_in(&self, division: Division) -> Vec<usize> {
        self.stops
            .iter()
            .filter(|(_, id)| id.division == division)
            .map(|(ordinal, _)| *ordinal)
            .collect()
    }

    /// All drawn stops, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &StopId)> {
        self.stops.iter().map(|(ordinal, id)| (*ordinal, id))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// Keys currently held down, with their press time.
#[derive(Clone, Debug, Default)]
pub struct HeldKeys {
    keys: BTreeMap<(Division, u8), SystemTime>,
}

impl HeldKeys {
    /// Record a key press. A repeated press keeps the original timestamp.
    pub fn press(&mut self, division: Division, note: u8) -> bool {
        if self.keys.contains_key(&(division, note)) {
            return false;
        }
        self.keys.insert((division, note), SystemTime::now());
        true
    }

    pub fn release(&mut self, division: Division, note: u8) -> bool {
        self.keys.remove(&(division, note)).is_some()
    }

    pub fn is_held(&self, division: Division, note: u8) -> bool {
        self.keys.contains_key(&(division, note))
    }

    /// Held notes on one division, lowest first.
    pub fn held_in(&self, division: Division) -> Vec<u8> {
        self.keys
            .range((division, 0)..=(division, u8::MAX))
            .map(|((_, note), _)| *note)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Division, u8, SystemTime)> + '_ {
        self.keys.iter().map(|((d, n), t)| (*d, *n, *t))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Address of one sounding note at the output boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundingKey {
    pub output: String,
    pub channel: u8,
    pub note: u8,
}

/// What keeps a sounding note on: a held key routed through a drawn stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteSource {
    pub division: Division,
    pub key: u8,
    /// Catalog ordinal of the stop.
    pub stop: usize,
}

/// A note commanded on at an output.
#[derive(Clone, Debug)]
pub struct SoundingNote {
    pub rank_id: String,
    pub since: SystemTime,
    pub sources: BTreeSet<NoteSource>,
}

/// Notes currently commanded on, one entry per (output, channel, note).
#[derive(Clone, Debug, Default)]
pub struct SoundingNotes {
    notes: BTreeMap<SoundingKey, SoundingNote>,
}

impl SoundingNotes {
    /// Add a source to a note. Returns true if the note was not sounding before.
    pub fn attach(&mut self, key: SoundingKey, rank_id: &str, source: NoteSource) -> bool {
        match self.notes.get_mut(&key) {
            Some(entry) => {
                entry.sources.insert(source);
                false
            }
            None => {
                self.notes.insert(
                    key,
                    SoundingNote {
                        rank_id: rank_id.to_string(),
                        since: SystemTime::now(),
                        sources: BTreeSet::from([source]),
                    },
                );
                true
            }
        }
    }

    /// Remove a source from a note. Returns true if that was the last source
    /// and the entry is gone.
    pub fn detach(&mut self, key: &SoundingKey, source: &NoteSource) -> bool {
        let Some(entry) = self.notes.get_mut(key) else {
            return false;
        };
        if !entry.sources.remove(source) {
            return false;
        }
        if entry.sources.is_empty() {
            self.notes.remove(key);
            return true;
        }
        false
    }

    /// Replace whatever owns the note with a single source.
    pub fn overwrite(&mut self, key: SoundingKey, rank_id: &str, source: NoteSource) {
        self.notes.insert(
            key,
            SoundingNote {
                rank_id: rank_id.to_string(),
                since: SystemTime::now(),
                sources: BTreeSet::from([source]),
            },
        );
    }

    pub fn erase(&mut self, key: &SoundingKey) -> bool {
        self.notes.remove(key).is_some()
    }

    pub fn is_sounding(&self, key: &SoundingKey) -> bool {
        self.notes.contains_key(key)
    }

    /// True if removing `sources` would leave the note with no source.
    pub fn released_by(&self, key: &SoundingKey, sources: &[NoteSource]) -> bool {
        self.notes
            .get(key)
            .map_or(false, |entry| entry.sources.iter().all(|s| sources.contains(s)))
    }

    pub fn get(&self, key: &SoundingKey) -> Option<&SoundingNote> {
        self.notes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SoundingKey, &SoundingNote)> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(note: u8) -> SoundingKey {
        SoundingKey {
            output: "pipes".to_string(),
            channel: 0,
            note,
        }
    }

    fn source(stop: usize) -> NoteSource {
        NoteSource {
            division: Division::Great,
            key: 60,
            stop,
        }
    }

    #[test]
    fn test_held_keys_idempotent() {
        let mut keys = HeldKeys::default();
        assert!(keys.press(Division::Great, 60));
        let (_, _, first) = keys.iter().next().unwrap();
        assert!(!keys.press(Division::Great, 60));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.iter().next().unwrap().2, first);

        keys.press(Division::Swell, 62);
        keys.press(Division::Great, 48);
        assert_eq!(keys.held_in(Division::Great), vec![48, 60]);
        assert_eq!(keys.held_in(Division::Swell), vec![62]);
        assert!(keys.held_in(Division::Pedal).is_empty());

        assert!(keys.release(Division::Great, 60));
        assert!(!keys.release(Division::Great, 60));
        assert!(!keys.is_held(Division::Great, 60));
    }

    #[test]
    fn test_active_stops_order() {
        let mut active = ActiveStops::default();
        assert!(active.insert(3, StopId::new(Division::Great, "B")));
        assert!(active.insert(1, StopId::new(Division::Great, "A")));
        assert!(active.insert(2, StopId::new(Division::Swell, "C")));
        assert!(!active.insert(1, StopId::new(Division::Great, "A")));

        assert_eq!(active.ordinals_in(Division::Great), vec![1, 3]);
        assert_eq!(active.ordinals_in(Division::Swell), vec![2]);
        assert!(active.remove(3));
        assert!(!active.remove(3));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_sounding_attach_detach() {
        let mut notes = SoundingNotes::default();
        assert!(notes.attach(key(60), "R1", source(0)));
        assert!(!notes.attach(key(60), "R1", source(1)));
        assert!(!notes.attach(key(60), "R1", source(1)));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes.get(&key(60)).unwrap().sources.len(), 2);

        assert!(!notes.detach(&key(60), &source(0)));
        assert_eq!(notes.len(), 1);
        // Detaching a source that is not recorded changes nothing.
        assert!(!notes.detach(&key(60), &source(7)));
        assert!(!notes.released_by(&key(60), &[source(0)]));
        assert!(notes.released_by(&key(60), &[source(0), source(1)]));
        assert!(notes.detach(&key(60), &source(1)));
        assert!(notes.is_empty());
        assert!(!notes.released_by(&key(60), &[source(1)]));
        assert!(!notes.detach(&key(60), &source(1)));
    }

    #[test]
    fn test_sounding_overwrite() {
        let mut notes = SoundingNotes::default();
        notes.attach(key(60), "R1", source(0));
        notes.attach(key(60), "R1", source(1));
        notes.overwrite(key(60), "R2", source(2));
        let entry = notes.get(&key(60)).unwrap();
        assert_eq!(entry.rank_id, "R2");
        assert_eq!(entry.sources.len(), 1);
        assert!(notes.erase(&key(60)));
        assert!(!notes.erase(&key(60)));
    }
}
