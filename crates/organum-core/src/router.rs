//! Stop router.
//!
//! Turns key events on a division into rank-level note commands. For every
//! drawn stop of the division (in catalog declaration order) and every rank
//! it couples to, the played note is mapped to the rank's native note, range
//! checked and deduplicated by `(rank, note)` so that one key event never
//! opens the same pipe twice.
//!
//! The router never takes the state lock itself; callers pass the locked
//! [`OrganState`] in.

use std::sync::Arc;

use crate::catalog::{Catalog, Division, OutputAddress, Rank};
use crate::config::SharedNotePolicy;
use crate::output::{
    NoteSink, OutputMessage, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_RESET_ALL_CONTROLLERS,
};
use crate::pitch;
use crate::state::{NoteSource, OrganState, SoundingKey};

/// One rank note a key event resolves to.
#[derive(Debug)]
struct Target<'a> {
    rank: &'a Rank,
    address: &'a OutputAddress,
    note: u8,
    /// Velocity from the first coupling that produced this note.
    velocity: u8,
    /// Ordinals of every stop that produced this note.
    stops: Vec<usize>,
}

pub struct Router {
    catalog: Arc<Catalog>,
    sink: Arc<dyn NoteSink>,
    policy: SharedNotePolicy,
}

impl Router {
    pub fn new(catalog: Arc<Catalog>, sink: Arc<dyn NoteSink>, policy: SharedNotePolicy) -> Self {
        Self {
            catalog,
            sink,
            policy,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn policy(&self) -> SharedNotePolicy {
        self.policy
    }

    /// Process a key press. Returns the number of commands emitted.
    ///
    /// The key is recorded as held even when no stop is drawn, so a stop drawn
    /// later retriggers it.
    pub fn key_down(&self, state: &mut OrganState, division: Division, note: u8, velocity: u8) -> usize {
        state.keys.press(division, note);
        let stops = state.active_stops.ordinals_in(division);
        if stops.is_empty() {
            log::debug!("{} key {} pressed with no stops drawn", division, note);
            return 0;
        }
        self.sound(state, division, note, velocity, &stops)
    }

    /// Process a key release. Returns the number of commands emitted.
    pub fn key_up(&self, state: &mut OrganState, division: Division, note: u8) -> usize {
        state.keys.release(division, note);
        let stops = state.active_stops.ordinals_in(division);
        if stops.is_empty() {
            return 0;
        }
        self.silence(state, division, note, &stops)
    }

    /// Route one held key through a single stop as note-on.
    pub fn sound_through(
        &self,
        state: &mut OrganState,
        stop: usize,
        division: Division,
        note: u8,
        velocity: u8,
    ) -> usize {
        self.sound(state, division, note, velocity, &[stop])
    }

    /// Route one held key through a single stop as note-off.
    pub fn silence_through(&self, state: &mut OrganState, stop: usize, division: Division, note: u8) -> usize {
        self.silence(state, division, note, &[stop])
    }

    /// Send all-notes-off, all-sound-off and reset-controllers on every
    /// channel of every output, then forget all held keys and sounding notes.
    ///
    /// Drawn stops are left as they are.
    pub fn panic(&self, state: &mut OrganState) -> usize {
        let mut sent = 0;
        for output in self.catalog.outputs() {
            for channel in 0..16u8 {
                for controller in [CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_RESET_ALL_CONTROLLERS] {
                    let message = OutputMessage::ControlChange {
                        channel,
                        controller,
                        value: 0,
                    };
                    if self.emit(output, message) {
                        sent += 1;
                    }
                }
            }
        }
        state.keys.clear();
        state.sounding.clear();
        log::warn!("PANIC: silenced {} outputs", self.catalog.outputs().len());
        sent
    }

    /// Note-ons that the sink rejects leave the sounding set untouched.
    fn sound(&self, state: &mut OrganState, division: Division, key: u8, velocity: u8, stops: &[usize]) -> usize {
        let mut sent = 0;
        for target in self.plan(stops, key, velocity) {
            let sounding = SoundingKey {
                output: target.address.output.clone(),
                channel: target.address.channel,
                note: target.note,
            };
            let sources: Vec<NoteSource> = target
                .stops
                .iter()
                .map(|&stop| NoteSource { division, key, stop })
                .collect();

            if self.policy == SharedNotePolicy::Preserve && state.sounding.is_sounding(&sounding) {
                for source in sources {
                    state.sounding.attach(sounding.clone(), &target.rank.id, source);
                }
                log::debug!(
                    "{} note {} already sounding on {}, not re-sent",
                    target.rank.id,
                    target.note,
                    target.address
                );
                continue;
            }

            let message = OutputMessage::NoteOn {
                channel: target.address.channel,
                note: target.note,
                velocity: target.velocity,
            };
            if !self.emit(&target.address.output, message) {
                continue;
            }
            sent += 1;

            let mut sources = sources.into_iter();
            if let Some(first) = sources.next() {
                state.sounding.overwrite(sounding.clone(), &target.rank.id, first);
            }
            for source in sources {
                state.sounding.attach(sounding.clone(), &target.rank.id, source);
            }
        }
        sent
    }

    /// A note-off that the sink rejects keeps the note recorded as sounding.
    fn silence(&self, state: &mut OrganState, division: Division, key: u8, stops: &[usize]) -> usize {
        let mut sent = 0;
        for target in self.plan(stops, key, 0) {
            let sounding = SoundingKey {
                output: target.address.output.clone(),
                channel: target.address.channel,
                note: target.note,
            };
            let sources: Vec<NoteSource> = target
                .stops
                .iter()
                .map(|&stop| NoteSource { division, key, stop })
                .collect();

            if self.policy == SharedNotePolicy::Preserve && !state.sounding.released_by(&sounding, &sources) {
                for source in &sources {
                    state.sounding.detach(&sounding, source);
                }
                continue;
            }

            let message = OutputMessage::NoteOff {
                channel: target.address.channel,
                note: target.note,
            };
            if self.emit(&target.address.output, message) {
                state.sounding.erase(&sounding);
                sent += 1;
            }
        }
        sent
    }

    /// Resolve a played note through the given stops into deduplicated rank notes.
    ///
    /// Per-coupling problems (unknown rank, missing pitch reference,
    /// unresolved output) skip only that coupling.
    fn plan(&self, stops: &[usize], played: u8, velocity: u8) -> Vec<Target<'_>> {
        let mut targets: Vec<Target<'_>> = Vec::new();
        for &ordinal in stops {
            let Some(stop) = self.catalog.stops().get(ordinal) else {
                continue;
            };
            for coupling in &stop.couplings {
                let Some(rank) = self.catalog.rank(&coupling.rank) else {
                    log::warn!("Stop {} couples unknown rank '{}', skipping", stop.id, coupling.rank);
                    continue;
                };
                let Some(reference) = rank.pitch_reference else {
                    log::warn!("Rank '{}' has no pitch reference, skipping", rank.id);
                    continue;
                };

                let mapped = pitch::map_note(played, coupling.transpose, reference);
                if !pitch::in_range(mapped, rank) {
                    log::debug!("{} -> {} note {} out of range", stop.id, rank.id, mapped);
                    continue;
                }
                let Some(note) = pitch::to_midi_note(mapped) else {
                    log::debug!("{} -> {} note {} is not a MIDI note", stop.id, rank.id, mapped);
                    continue;
                };

                if let Some(existing) = targets
                    .iter_mut()
                    .find(|t| t.rank.id == rank.id && t.note == note)
                {
                    if !existing.stops.contains(&ordinal) {
                        existing.stops.push(ordinal);
                    }
                    continue;
                }

                let Some(address) = rank.output.as_ref() else {
                    log::warn!("Rank '{}' has no resolved output, dropping note {}", rank.id, note);
                    continue;
                };

                targets.push(Target {
                    rank,
                    address,
                    note,
                    velocity: coupling.velocity(velocity),
                    stops: vec![ordinal],
                });
            }
        }
        targets
    }

    fn emit(&self, output: &str, message: OutputMessage) -> bool {
        match self.sink.send(output, message) {
            Ok(()) => {
                log::debug!("-> [{}] {}", output, message);
                true
            }
            Err(e) => {
                log::warn!("Dropped {} for '{}': {}", message, output, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("policy", &self.policy)
            .field("stops", &self.catalog.stops().len())
            .finish_non_exhaustive()
    }
}
