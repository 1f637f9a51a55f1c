//! Health, status and panic handlers.

use axum::{extract::State, Json};
use organum_core::actions::{Health, PanicResult, Status};
use std::sync::Arc;

use crate::{
    models::{respond, ApiResponse},
    AppState,
};

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(state.actions.health())
}

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResponse<Status> {
    respond(state.actions.get_status())
}

/// POST /api/panic
pub async fn panic(State(state): State<Arc<AppState>>) -> ApiResponse<PanicResult> {
    log::warn!("Panic requested over HTTP");
    respond(state.actions.panic())
}
