//! The organ engine.
//!
//! [`Organ`] is the context object shared by the input worker, the shell and
//! the HTTP server. It owns the catalog, the router, the stop registry and
//! the single state lock; every operation takes that lock exactly once.

use std::sync::Arc;

use crate::catalog::{Catalog, Division, StopId};
use crate::config::{RoutingSettings, SharedNotePolicy};
use crate::error::ActionError;
use crate::input::InputEvent;
use crate::output::NoteSink;
use crate::router::Router;
use crate::state::{OrganState, StateManager};
use crate::stops::{Activation, Deactivation, StopRegistry};

#[derive(Clone, Debug)]
pub struct Organ {
    catalog: Arc<Catalog>,
    state: StateManager,
    router: Arc<Router>,
    registry: Arc<StopRegistry>,
}

impl Organ {
    pub fn new(catalog: Arc<Catalog>, sink: Arc<dyn NoteSink>, routing: &RoutingSettings) -> Self {
        let router = Arc::new(Router::new(catalog.clone(), sink, routing.shared_notes));
        let registry = Arc::new(StopRegistry::new(router.clone(), routing.retrigger_velocity));
        log::info!(
            "Organ engine ready: {} stops, shared notes {:?}",
            catalog.stops().len(),
            routing.shared_notes
        );
        Self {
            catalog,
            state: StateManager::new(),
            router,
            registry,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn shared_notes(&self) -> SharedNotePolicy {
        self.router.policy()
    }

    pub fn snapshot(&self) -> OrganState {
        self.state.snapshot()
    }

    pub fn key_down(&self, division: Division, note: u8, velocity: u8) -> usize {
        log::info!("Key ON: {} note {} vel {}", division, note, velocity);
        self.state.with_state_mut(|state| {
            if state.closed {
                return 0;
            }
            let sent = self.router.key_down(state, division, note, velocity);
            state.bump_version();
            sent
        })
    }

    pub fn key_up(&self, division: Division, note: u8) -> usize {
        log::info!("Key OFF: {} note {}", division, note);
        self.state.with_state_mut(|state| {
            if state.closed {
                return 0;
            }
            let sent = self.router.key_up(state, division, note);
            state.bump_version();
            sent
        })
    }

    /// Resolve a bare or qualified stop id against the catalog.
    pub fn resolve_stop(&self, id: &str) -> Result<StopId, ActionError> {
        self.catalog
            .resolve(id)
            .map(|stop| stop.id.clone())
            .ok_or_else(|| ActionError::UnknownStop(id.trim().to_string()))
    }

    pub fn activate(&self, id: &StopId) -> Result<Activation, ActionError> {
        self.state.with_state_mut(|state| {
            if state.closed {
                return Err(ActionError::ShuttingDown);
            }
            let result = self.registry.activate(state, id);
            state.bump_version();
            result
        })
    }

    pub fn deactivate(&self, id: &StopId) -> Result<Deactivation, ActionError> {
        self.state.with_state_mut(|state| {
            if state.closed {
                return Err(ActionError::ShuttingDown);
            }
            let result = self.registry.deactivate(state, id);
            state.bump_version();
            result
        })
    }

    pub fn is_active(&self, id: &StopId) -> bool {
        match self.catalog.ordinal(id) {
            Some(ordinal) => self.state.with_state(|s| s.active_stops.contains(ordinal)),
            None => false,
        }
    }

    /// Cancel every drawn stop. Returns the stops that were cancelled.
    pub fn all_clear(&self) -> Vec<StopId> {
        let cleared = self.state.with_state_mut(|state| {
            if state.closed {
                return Vec::new();
            }
            let cleared = self.registry.clear_all(state);
            state.bump_version();
            cleared
        });
        log::info!("All clear: {} stops cancelled", cleared.len());
        cleared
    }

    /// Broadcast panic controllers and forget held keys and sounding notes.
    pub fn panic(&self) -> usize {
        self.state.with_state_mut(|state| {
            let sent = self.router.panic(state);
            state.bump_version();
            sent
        })
    }

    /// Apply a classified input event.
    pub fn handle(&self, event: InputEvent) {
        match event {
            InputEvent::KeyDown {
                division,
                note,
                velocity,
            } => {
                self.key_down(division, note, velocity);
            }
            InputEvent::KeyUp { division, note } => {
                self.key_up(division, note);
            }
            InputEvent::StopDraw(id) => {
                log::info!("STOP DRAW: {}", id);
                if let Err(e) = self.activate(&id) {
                    log::warn!("{}", e);
                }
            }
            InputEvent::StopCancel(id) => {
                log::info!("STOP CANCEL: {}", id);
                if let Err(e) = self.deactivate(&id) {
                    log::warn!("{}", e);
                }
            }
            InputEvent::Other => {}
        }
    }

    /// Leave nothing sounding: cancel all stops, then panic, then refuse
    /// any further key or stop event. All under one lock acquisition.
    pub fn shutdown(&self) {
        log::info!("Silencing organ for shutdown");
        self.state.with_state_mut(|state| {
            if state.closed {
                return;
            }
            let cleared = self.registry.clear_all(state);
            self.router.panic(state);
            state.closed = true;
            state.bump_version();
            log::info!("Organ closed: {} stops cancelled", cleared.len());
        });
    }
}
