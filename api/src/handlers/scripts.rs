use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use common::errors::{DatabaseError, ValidationError};
use common::models::{Script, ScriptKind, UserClaims};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateScriptRequest {
    pub name: String,
    pub content: String,
    pub kind: ScriptKind,
    pub description: Option<String>,
}

fn validate_script_request(req: &CreateScriptRequest) -> Result<(), ValidationError> {
    if req.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()));
    }
    if req.content.trim().is_empty() {
        return Err(ValidationError::MissingField("content".to_string()));
    }
    Ok(())
}

#[tracing::instrument(skip(state))]
pub async fn list_scripts(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Script>>, ErrorResponse> {
    let scripts = state.script_repo().find_all().await?;
    Ok(SuccessResponse::new(scripts))
}

#[tracing::instrument(skip(state))]
pub async fn get_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<Script>, ErrorResponse> {
    let script = state
        .script_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Script not found: {}", id)))?;
    Ok(SuccessResponse::new(script))
}

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_script(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<CreateScriptRequest>,
) -> Result<SuccessResponse<Script>, ErrorResponse> {
    validate_script_request(&req)?;

    let now = Utc::now();
    let script = Script {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        content: req.content,
        kind: req.kind,
        description: req.description,
        created_by: claims.sub,
        created_at: now,
        updated_at: now,
    };

    state.script_repo().create(&script).await?;
    Ok(SuccessResponse::new(script))
}

#[tracing::instrument(skip(state, req))]
pub async fn update_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateScriptRequest>,
) -> Result<SuccessResponse<Script>, ErrorResponse> {
    validate_script_request(&req)?;

    let repo = state.script_repo();
    let mut script = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Script not found: {}", id)))?;

    script.name = req.name.trim().to_string();
    script.content = req.content;
    script.kind = req.kind;
    script.description = req.description;

    repo.update(&script).await?;
    Ok(SuccessResponse::new(script))
}

/// Delete a script. Past executions keep their snapshotted content.
#[tracing::instrument(skip(state))]
pub async fn delete_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.script_repo().delete(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}
