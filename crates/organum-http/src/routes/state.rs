//! Live state endpoint handlers.

use axum::extract::State;
use organum_core::actions::StateView;
use organum_core::StateFilter;
use std::sync::Arc;

use crate::{
    models::{respond, ApiResponse},
    AppState,
};

/// GET /api/state - Held keys, sounding notes and drawn stops
pub async fn get_state(State(state): State<Arc<AppState>>) -> ApiResponse<StateView> {
    respond(state.actions.get_state(StateFilter::All))
}

/// GET /api/state/keys
pub async fn get_keys(State(state): State<Arc<AppState>>) -> ApiResponse<StateView> {
    respond(state.actions.get_state(StateFilter::Keys))
}

/// GET /api/state/notes
pub async fn get_notes(State(state): State<Arc<AppState>>) -> ApiResponse<StateView> {
    respond(state.actions.get_state(StateFilter::Notes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::app_state;
    use axum::Json;

    #[tokio::test]
    async fn test_state_views() {
        let (state, _) = app_state();
        state.actions.activate_stop("PEDAL_BOURDON_16").unwrap();
        state.actions.simulate_key("P", 60, true).unwrap();

        let (_, Json(body)) = get_state(State(state.clone())).await;
        let view = body.payload.unwrap();
        assert_eq!(view.keys.unwrap().len(), 1);
        let notes = view.notes.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note, 48);
        assert_eq!(view.active_stops, vec!["pedal:PEDAL_BOURDON_16"]);

        let (_, Json(body)) = get_keys(State(state.clone())).await;
        let view = body.payload.unwrap();
        assert!(view.keys.is_some());
        assert!(view.notes.is_none());

        let (_, Json(body)) = get_notes(State(state)).await;
        let view = body.payload.unwrap();
        assert!(view.keys.is_none());
        assert!(view.notes.is_some());
    }
}
