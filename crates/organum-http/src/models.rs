//! Response shapes shared by the route handlers.

use axum::{http::StatusCode, Json};
use organum_core::{ActionError, ActionResponse};
use serde::Serialize;

/// A facade result as returned over HTTP.
pub type ApiResponse<T> = (StatusCode, Json<ActionResponse<T>>);

/// HTTP status for a facade error.
///
/// Cancelling a stop that is not drawn is reported, not failed.
pub fn status_for(error: &ActionError) -> StatusCode {
    match error {
        ActionError::UnknownStop(_) => StatusCode::NOT_FOUND,
        ActionError::StopNotActive(_) => StatusCode::OK,
        ActionError::UnknownDivision(_) | ActionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ActionError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn respond<T: Serialize>(result: Result<T, ActionError>) -> ApiResponse<T> {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            log::debug!("API request failed: {}", e);
            status_for(e)
        }
    };
    (status, Json(result.into()))
}
