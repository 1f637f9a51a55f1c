//! Stop endpoint handlers.

use axum::extract::{Path, Query, State};
use organum_core::actions::{ActiveStopList, ClearResult, StopChange, StopList};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    models::{respond, ApiResponse},
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct StopsQuery {
    pub division: Option<String>,
}

/// GET /api/stops?division= - List stops, optionally for one division
pub async fn list_stops(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StopsQuery>,
) -> ApiResponse<StopList> {
    respond(state.actions.list_stops(query.division.as_deref()))
}

/// GET /api/stops/active
pub async fn active_stops(State(state): State<Arc<AppState>>) -> ApiResponse<ActiveStopList> {
    respond(state.actions.get_active_stops())
}

/// POST /api/stops/:id/on - Draw a stop
pub async fn activate_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse<StopChange> {
    respond(state.actions.activate_stop(&id))
}

/// POST /api/stops/:id/off - Cancel a stop
pub async fn deactivate_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse<StopChange> {
    respond(state.actions.deactivate_stop(&id))
}

/// POST /api/stops/all-clear
pub async fn all_clear(State(state): State<Arc<AppState>>) -> ApiResponse<ClearResult> {
    respond(state.actions.all_clear())
}
