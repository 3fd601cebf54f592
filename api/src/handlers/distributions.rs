use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::errors::{DatabaseError, ValidationError};
use common::models::{FileDistribution, FileDistributionDetail, UserClaims};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDistributionRequest {
    pub file_id: Uuid,
    pub host_ids: Vec<Uuid>,
    pub target_path: String,
}

#[derive(Debug, Serialize)]
pub struct DistributionWithDetails {
    #[serde(flatten)]
    pub distribution: FileDistribution,
    pub details: Vec<FileDistributionDetail>,
}

fn validate_distribution_request(req: &CreateDistributionRequest) -> Result<(), ValidationError> {
    if req.host_ids.is_empty() {
        return Err(ValidationError::MissingField("host_ids".to_string()));
    }
    if req.target_path.trim().is_empty() {
        return Err(ValidationError::MissingField("target_path".to_string()));
    }
    if !req.target_path.starts_with('/') {
        return Err(ValidationError::InvalidFieldValue {
            field: "target_path".to_string(),
            reason: "must be an absolute path".to_string(),
        });
    }
    Ok(())
}

/// Start distributing a stored file to a set of hosts. Returns immediately
/// with the pending distribution record; transfers proceed in the background.
#[tracing::instrument(skip(state, req), fields(user_id = %claims.sub, file_id = %req.file_id, hosts = req.host_ids.len()))]
pub async fn create_distribution(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<CreateDistributionRequest>,
) -> Result<SuccessResponse<FileDistribution>, ErrorResponse> {
    validate_distribution_request(&req)?;

    let file = state
        .file_repo()
        .find_by_id(req.file_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", req.file_id)))?;

    let hosts = state.host_repo().find_by_ids(&req.host_ids).await?;
    if hosts.len() != req.host_ids.len() {
        return Err(ValidationError::InvalidFieldValue {
            field: "host_ids".to_string(),
            reason: "some hosts no longer exist".to_string(),
        }
        .into());
    }

    // The file is read once up front and shared by every transfer task
    let data = Arc::new(state.artifacts.load(&file).await?);

    let distribution = FileDistribution::new(
        file.id,
        req.host_ids,
        req.target_path.trim().to_string(),
        claims.sub,
    );
    state.distribution_repo().create(&distribution).await?;

    let handle = state
        .distributions
        .begin(distribution.clone(), data, hosts)
        .await?;
    drop(handle);

    Ok(SuccessResponse::new(distribution))
}

#[tracing::instrument(skip(state))]
pub async fn list_distributions(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<FileDistribution>>, ErrorResponse> {
    let distributions = state.distribution_repo().find_all().await?;
    Ok(SuccessResponse::new(distributions))
}

/// Fetch a distribution with its per-host details
#[tracing::instrument(skip(state))]
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<DistributionWithDetails>, ErrorResponse> {
    let repo = state.distribution_repo();
    let distribution = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Distribution not found: {}", id)))?;
    let details = repo.find_details(id).await?;

    Ok(SuccessResponse::new(DistributionWithDetails {
        distribution,
        details,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn delete_distribution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.distribution_repo().delete(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}
