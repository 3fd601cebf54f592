use axum::extract::State;
use serde::Serialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

/// Liveness and database health check
#[tracing::instrument(skip(state))]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<SuccessResponse<HealthStatus>, ErrorResponse> {
    state.db_pool.health_check().await?;

    Ok(SuccessResponse::new(HealthStatus {
        status: "ok",
        database: "ok",
    }))
}
