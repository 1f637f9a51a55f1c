//! HTTP REST API server for Organum.
//!
//! Exposes the action facade of a running organ under `/api`, for remote
//! consoles and the browser front end.
//!
//! # Usage
//!
//! ```ignore
//! use organum_http::start_server;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! runtime.block_on(start_server(actions, "0.0.0.0", 5000))?;
//! ```

mod models;
mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use organum_core::Actions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use models::{status_for, ApiResponse};

/// Shared application state for HTTP handlers.
pub struct AppState {
    pub actions: Actions,
}

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Control
        .route("/api/health", get(routes::control::health))
        .route("/api/status", get(routes::control::status))
        .route("/api/panic", post(routes::control::panic))
        // Stops
        .route("/api/stops", get(routes::stops::list_stops))
        .route("/api/stops/active", get(routes::stops::active_stops))
        .route("/api/stops/all-clear", post(routes::stops::all_clear))
        .route("/api/stops/:id/on", post(routes::stops::activate_stop))
        .route("/api/stops/:id/off", post(routes::stops::deactivate_stop))
        // State
        .route("/api/state", get(routes::state::get_state))
        .route("/api/state/keys", get(routes::state::get_keys))
        .route("/api/state/notes", get(routes::state::get_notes))
        // Simulated keys
        .route("/api/keys/:division/:note/on", post(routes::keys::key_on))
        .route("/api/keys/:division/:note/off", post(routes::keys::key_off))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Start the HTTP server and serve until the task is dropped.
pub async fn start_server(actions: Actions, host: &str, port: u16) -> std::io::Result<()> {
    let state = Arc::new(AppState { actions });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("HTTP API server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use organum_core::{Actions, Catalog, CollectingSink, Organ, OrganConfig};
    use std::sync::Arc;

    pub const CONFIG: &str = r#"
        [[outputs]]
        name = "pipes"
        client_port = "20:2"

        [[ranks]]
        id = "R1"
        pitch_reference = 60
        first_note = 36
        last_note = 96
        address = "pipes 20:2:0"

        [[stops]]
        division = "great"
        id = "GREAT_PRINCIPAL_8"
        name = "Principal 8'"
        ranks = [{ rank = "R1" }]

        [[stops]]
        division = "pedal"
        id = "PEDAL_BOURDON_16"
        ranks = [{ rank = "R1", transpose = -12 }]
    "#;

    pub fn app_state() -> (Arc<AppState>, Arc<CollectingSink>) {
        let config = OrganConfig::from_toml_str(CONFIG).unwrap();
        let catalog = Arc::new(Catalog::from_config(&config).unwrap());
        let sink = Arc::new(CollectingSink::new());
        let organ = Organ::new(catalog, sink.clone(), &config.routing);
        (
            Arc::new(AppState {
                actions: Actions::new(organ),
            }),
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_builds() {
        let (state, _) = test_support::app_state();
        let _ = build_router(state);
    }
}
