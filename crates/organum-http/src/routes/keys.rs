//! Simulated key handlers.

use axum::extract::{Path, State};
use organum_core::actions::KeyResult;
use organum_core::ActionError;
use std::sync::Arc;

use crate::{
    models::{respond, ApiResponse},
    AppState,
};

fn simulate(state: &AppState, division: &str, note: &str, down: bool) -> Result<KeyResult, ActionError> {
    let note: i64 = note
        .trim()
        .parse()
        .map_err(|_| ActionError::InvalidInput(format!("Invalid note: {}. Must be 0-127", note)))?;
    state.actions.simulate_key(division, note, down)
}

/// POST /api/keys/:division/:note/on
pub async fn key_on(
    State(state): State<Arc<AppState>>,
    Path((division, note)): Path<(String, String)>,
) -> ApiResponse<KeyResult> {
    respond(simulate(&state, &division, &note, true))
}

/// POST /api/keys/:division/:note/off
pub async fn key_off(
    State(state): State<Arc<AppState>>,
    Path((division, note)): Path<(String, String)>,
) -> ApiResponse<KeyResult> {
    respond(simulate(&state, &division, &note, false))
}
