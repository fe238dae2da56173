use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

/// Liveness report.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthResponse)
    )
)]
/// Health check endpoint for the REST API
///
/// Reports whether the service can reach its database. Used for monitoring and load
/// balancer health checks.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    match state.patients.database().ping().await {
        Ok(()) => Json(HealthResponse {
            ok: true,
            message: "Patient registry REST API is alive".into(),
        }),
        Err(e) => {
            tracing::error!("Health check database error: {:?}", e);
            Json(HealthResponse {
                ok: false,
                message: "Database unavailable".into(),
            })
        }
    }
}
