//! Stop registry: draw and cancel transitions.
//!
//! Drawing a stop replays every held key of its division through that stop
//! alone, so sustained notes pick up the new registration. Cancelling replays
//! the same keys as note-offs before the stop leaves the active set.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::StopId;
use crate::error::ActionError;
use crate::router::Router;
use crate::state::OrganState;

/// Outcome of drawing a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Activation {
    Activated { retriggered: usize },
    AlreadyActive,
}

/// Outcome of cancelling a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Deactivation {
    Deactivated { silenced: usize },
    NotActive,
}

#[derive(Debug)]
pub struct StopRegistry {
    router: Arc<Router>,
    retrigger_velocity: u8,
}

impl StopRegistry {
    pub fn new(router: Arc<Router>, retrigger_velocity: u8) -> Self {
        Self {
            router,
            retrigger_velocity: retrigger_velocity.clamp(1, 127),
        }
    }

    /// Draw a stop. Drawing an already drawn stop has no side effects.
    pub fn activate(&self, state: &mut OrganState, id: &StopId) -> Result<Activation, ActionError> {
        let ordinal = self
            .router
            .catalog()
            .ordinal(id)
            .ok_or_else(|| ActionError::UnknownStop(id.to_string()))?;

        if !state.active_stops.insert(ordinal, id.clone()) {
            log::debug!("Stop {} already drawn", id);
            return Ok(Activation::AlreadyActive);
        }

        let mut retriggered = 0;
        for note in state.keys.held_in(id.division) {
            retriggered += self.router.sound_through(state, ordinal, id.division, note, self.retrigger_velocity);
        }
        log::info!("Stop drawn: {} ({} notes retriggered)", id, retriggered);
        Ok(Activation::Activated { retriggered })
    }

    /// Cancel a stop. Cancelling a stop that is not drawn changes nothing.
    pub fn deactivate(&self, state: &mut OrganState, id: &StopId) -> Result<Deactivation, ActionError> {
        let ordinal = self
            .router
            .catalog()
            .ordinal(id)
            .ok_or_else(|| ActionError::UnknownStop(id.to_string()))?;

        if !state.active_stops.contains(ordinal) {
            log::debug!("Stop {} is not drawn", id);
            return Ok(Deactivation::NotActive);
        }

        let mut silenced = 0;
        for note in state.keys.held_in(id.division) {
            silenced += self.router.silence_through(state, ordinal, id.division, note);
        }
        state.active_stops.remove(ordinal);
        log::info!("Stop cancelled: {} ({} notes silenced)", id, silenced);
        Ok(Deactivation::Deactivated { silenced })
    }

    /// Cancel every drawn stop through the normal cancel path.
    pub fn clear_all(&self, state: &mut OrganState) -> Vec<StopId> {
        let drawn: Vec<StopId> = state.active_stops.iter().map(|(_, id)| id.clone()).collect();
        for id in &drawn {
            if let Err(e) = self.deactivate(state, id) {
                log::warn!("Failed to cancel {}: {}", id, e);
            }
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Division};
    use crate::config::{OrganConfig, SharedNotePolicy};
    use crate::output::{CollectingSink, OutputMessage};

    const CONFIG: &str = r#"
        [[outputs]]
        name = "pipes"
        client_port = "20:2"

        [[ranks]]
        id = "R1"
        pitch_reference = 60
        first_note = 36
        last_note = 96
        address = "pipes 20:2:0"

        [[ranks]]
        id = "R2"
        pitch_reference = 60
        address = "pipes 20:2:1"

        [[stops]]
        division = "great"
        id = "PRINCIPAL_8"
        ranks = [{ rank = "R1" }]

        [[stops]]
        division = "great"
        id = "DIAPASON_8"
        ranks = [{ rank = "R1" }]

        [[stops]]
        division = "great"
        id = "FLUTE_4"
        ranks = [{ rank = "R2", transpose = 12 }]

        [[stops]]
        division = "swell"
        id = "GEDACKT_8"
        ranks = [{ rank = "R1" }]
    "#;

    fn setup(policy: SharedNotePolicy) -> (StopRegistry, Arc<Router>, Arc<CollectingSink>) {
        let catalog = Catalog::from_config(&OrganConfig::from_toml_str(CONFIG).unwrap()).unwrap();
        let sink = Arc::new(CollectingSink::new());
        let router = Arc::new(Router::new(Arc::new(catalog), sink.clone(), policy));
        (StopRegistry::new(router.clone(), 64), router, sink)
    }

    fn great(name: &str) -> StopId {
        StopId::new(Division::Great, name)
    }

    fn note_ons(sink: &CollectingSink) -> Vec<(u8, u8, u8)> {
        sink.take()
            .into_iter()
            .filter_map(|c| match c.message {
                OutputMessage::NoteOn {
                    channel,
                    note,
                    velocity,
                } => Some((channel, note, velocity)),
                _ => None,
            })
            .collect()
    }

    fn note_offs(sink: &CollectingSink) -> Vec<(u8, u8)> {
        sink.take()
            .into_iter()
            .filter_map(|c| match c.message {
                OutputMessage::NoteOff { channel, note } => Some((channel, note)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_unknown_stop() {
        let (registry, _, _) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        assert_eq!(
            registry.activate(&mut state, &great("TRUMPET_8")),
            Err(ActionError::UnknownStop("great:TRUMPET_8".to_string()))
        );
        assert!(registry.deactivate(&mut state, &great("TRUMPET_8")).is_err());
        assert!(state.active_stops.is_empty());
    }

    #[test]
    fn test_retrigger_on_draw() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        router.key_down(&mut state, Division::Great, 60, 100);
        router.key_down(&mut state, Division::Great, 67, 100);
        router.key_down(&mut state, Division::Swell, 50, 100);
        assert!(sink.is_empty());

        let result = registry.activate(&mut state, &great("FLUTE_4")).unwrap();
        assert_eq!(result, Activation::Activated { retriggered: 2 });
        assert_eq!(note_ons(&sink), vec![(1, 72, 64), (1, 79, 64)]);
        assert_eq!(state.sounding.len(), 2);
    }

    #[test]
    fn test_draw_is_idempotent() {
        let (registry, router, sink) = setup(SharedNotePolicy::Independent);
        let mut state = OrganState::new();
        router.key_down(&mut state, Division::Great, 60, 100);
        registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap();
        sink.take();
        let before = state.sounding.len();

        assert_eq!(
            registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap(),
            Activation::AlreadyActive
        );
        assert!(sink.is_empty());
        assert_eq!(state.sounding.len(), before);
    }

    #[test]
    fn test_cancel_silences_exclusive_notes() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        registry.activate(&mut state, &great("FLUTE_4")).unwrap();
        router.key_down(&mut state, Division::Great, 60, 100);
        router.key_down(&mut state, Division::Great, 64, 100);
        sink.take();

        let result = registry.deactivate(&mut state, &great("FLUTE_4")).unwrap();
        assert_eq!(result, Deactivation::Deactivated { silenced: 2 });
        assert_eq!(note_offs(&sink), vec![(1, 72), (1, 76)]);
        assert!(state.sounding.is_empty());
        assert!(state.active_stops.is_empty());
        // Keys stay held.
        assert_eq!(state.keys.len(), 2);

        router.key_down(&mut state, Division::Great, 65, 100);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_cancel_inactive_reports_no_change() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        router.key_down(&mut state, Division::Great, 60, 100);
        assert_eq!(
            registry.deactivate(&mut state, &great("PRINCIPAL_8")).unwrap(),
            Deactivation::NotActive
        );
        assert!(sink.is_empty());
        assert_eq!(state.keys.len(), 1);
        assert!(state.sounding.is_empty());
    }

    #[test]
    fn test_preserve_keeps_covered_notes() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap();
        router.key_down(&mut state, Division::Great, 60, 100);
        assert_eq!(note_ons(&sink), vec![(0, 60, 100)]);

        // The second stop covers the same pipe: no second note-on.
        registry.activate(&mut state, &great("DIAPASON_8")).unwrap();
        assert!(sink.is_empty());

        // Cancelling either one leaves the pipe sounding for the other.
        registry.deactivate(&mut state, &great("PRINCIPAL_8")).unwrap();
        assert!(sink.is_empty());
        assert_eq!(state.sounding.len(), 1);

        registry.deactivate(&mut state, &great("DIAPASON_8")).unwrap();
        assert_eq!(note_offs(&sink), vec![(0, 60)]);
        assert!(state.sounding.is_empty());
    }

    #[test]
    fn test_preserve_keeps_notes_covered_by_other_division() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap();
        registry.activate(&mut state, &StopId::new(Division::Swell, "GEDACKT_8")).unwrap();
        router.key_down(&mut state, Division::Great, 60, 100);
        router.key_down(&mut state, Division::Swell, 60, 100);
        sink.take();

        registry.deactivate(&mut state, &great("PRINCIPAL_8")).unwrap();
        assert!(sink.is_empty());
        router.key_up(&mut state, Division::Swell, 60);
        assert_eq!(note_offs(&sink), vec![(0, 60)]);
    }

    #[test]
    fn test_independent_last_writer() {
        let (registry, router, sink) = setup(SharedNotePolicy::Independent);
        let mut state = OrganState::new();
        registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap();
        registry.activate(&mut state, &great("DIAPASON_8")).unwrap();
        router.key_down(&mut state, Division::Great, 60, 100);
        // Deduplicated within the event.
        assert_eq!(note_ons(&sink), vec![(0, 60, 100)]);

        registry.deactivate(&mut state, &great("DIAPASON_8")).unwrap();
        assert_eq!(note_offs(&sink), vec![(0, 60)]);
        assert!(state.sounding.is_empty());
    }

    #[test]
    fn test_clear_all_uses_cancel_path() {
        let (registry, router, sink) = setup(SharedNotePolicy::Preserve);
        let mut state = OrganState::new();
        registry.activate(&mut state, &great("PRINCIPAL_8")).unwrap();
        registry.activate(&mut state, &great("FLUTE_4")).unwrap();
        router.key_down(&mut state, Division::Great, 60, 100);
        sink.take();

        let cleared = registry.clear_all(&mut state);
        assert_eq!(cleared, vec![great("PRINCIPAL_8"), great("FLUTE_4")]);
        assert_eq!(note_offs(&sink), vec![(0, 60), (1, 72)]);
        assert!(state.active_stops.is_empty());
        assert!(state.sounding.is_empty());
        assert!(registry.clear_all(&mut state).is_empty());
    }

    #[test]
    fn test_retrigger_velocity_clamped_by_coupling() {
        let config = OrganConfig::from_toml_str(
            r#"
            [[outputs]]
            name = "pipes"
            client_port = "20:2"
            [[ranks]]
            id = "R1"
            pitch_reference = 60
            address = "pipes 20:2:0"
            [[stops]]
            division = "pedal"
            id = "SUBBASS_16"
            ranks = [{ rank = "R1", transpose = -12, velocity_min = 100, velocity_max = 110 }]
            "#,
        )
        .unwrap();
        let sink = Arc::new(CollectingSink::new());
        let router = Arc::new(Router::new(
            Arc::new(Catalog::from_config(&config).unwrap()),
            sink.clone(),
            SharedNotePolicy::Preserve,
        ));
        let registry = StopRegistry::new(router.clone(), 64);
        let mut state = OrganState::new();
        router.key_down(&mut state, Division::Pedal, 36, 127);
        registry
            .activate(&mut state, &StopId::new(Division::Pedal, "SUBBASS_16"))
            .unwrap();
        assert_eq!(note_ons(&sink), vec![(0, 24, 100)]);
    }
}
