use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use common::db::repositories::ExecutionFilter;
use common::errors::{DatabaseError, ValidationError};
use common::models::{Execution, ExecutionStatus, ScriptKind, UserClaims};
use common::storage::NewArtifact;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecutionListQuery {
    pub job_id: Option<Uuid>,
    pub host_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QuickExecRequest {
    pub name: String,
    pub kind: ScriptKind,
    pub content: String,
    pub host_ids: Vec<Uuid>,
    #[serde(default)]
    pub input_file_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct QuickExecResponse {
    pub execution_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SavedResult {
    pub output_file_id: Option<Uuid>,
    pub error_file_id: Option<Uuid>,
}

#[tracing::instrument(skip(state))]
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<SuccessResponse<Vec<Execution>>, ErrorResponse> {
    let filter = ExecutionFilter {
        job_id: query.job_id,
        host_id: query.host_id,
        status: query.status,
        limit: query.limit,
    };
    let executions = state.execution_repo().find_with_filter(filter).await?;
    Ok(SuccessResponse::new(executions))
}

#[tracing::instrument(skip(state))]
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<Execution>, ErrorResponse> {
    let execution = state
        .execution_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Execution not found: {}", id)))?;
    Ok(SuccessResponse::new(execution))
}

/// Remove the artifact files an execution saved, if any. Best effort: a
/// missing or undeletable file is logged, never a hard failure.
pub(crate) async fn delete_saved_artifacts(
    state: &AppState,
    execution: &Execution,
) -> Result<(), DatabaseError> {
    let file_repo = state.file_repo();
    for file_id in [execution.output_file_id, execution.error_file_id]
        .into_iter()
        .flatten()
    {
        if let Some(file) = file_repo.find_by_id(file_id).await? {
            if let Err(e) = state.artifacts.delete(&file).await {
                tracing::warn!(file_id = %file_id, error = %e, "Failed to delete saved artifact");
            }
        }
    }
    Ok(())
}

/// Delete an execution along with any artifacts saved from its output
#[tracing::instrument(skip(state))]
pub async fn delete_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    let repo = state.execution_repo();
    let execution = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Execution not found: {}", id)))?;

    delete_saved_artifacts(&state, &execution).await?;

    repo.delete(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}

/// Delete a batch of executions in one request, cascading each one's saved
/// artifacts. Executions that no longer exist are skipped.
#[tracing::instrument(skip(state, req), fields(count = req.ids.len()))]
pub async fn batch_delete_executions(
    State(state): State<AppState>,
    Json(req): Json<BatchDeleteRequest>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    if req.ids.is_empty() {
        return Err(ValidationError::MissingField("ids".to_string()).into());
    }

    let repo = state.execution_repo();
    let mut deleted = 0;
    for id in req.ids {
        let Some(execution) = repo.find_by_id(id).await? else {
            continue;
        };
        delete_saved_artifacts(&state, &execution).await?;
        repo.delete(id).await?;
        deleted += 1;
    }

    Ok(SuccessResponse::new(serde_json::json!({ "deleted": deleted })))
}

/// Run an ad-hoc script against a set of hosts without creating a job.
/// The content is snapshotted into each execution record.
#[tracing::instrument(skip(state, req), fields(user_id = %claims.sub, hosts = req.host_ids.len()))]
pub async fn quick_exec(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<QuickExecRequest>,
) -> Result<SuccessResponse<QuickExecResponse>, ErrorResponse> {
    if req.content.trim().is_empty() {
        return Err(ValidationError::MissingField("content".to_string()).into());
    }
    if req.host_ids.is_empty() {
        return Err(ValidationError::MissingField("host_ids".to_string()).into());
    }

    let hosts = state.host_repo().find_by_ids(&req.host_ids).await?;
    if hosts.len() != req.host_ids.len() {
        return Err(ValidationError::InvalidFieldValue {
            field: "host_ids".to_string(),
            reason: "some hosts no longer exist".to_string(),
        }
        .into());
    }

    let name = if req.name.trim().is_empty() {
        "quick-exec"
    } else {
        req.name.trim()
    };

    // Input files are read once and shared across all host tasks
    let mut input_files = Vec::with_capacity(req.input_file_ids.len());
    let file_repo = state.file_repo();
    for file_id in &req.input_file_ids {
        let file = file_repo
            .find_by_id(*file_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", file_id)))?;
        let data = state.artifacts.load(&file).await?;
        input_files.push((file.original_name.clone(), data));
    }

    let run = state
        .executions
        .launch_quick(
            name,
            req.kind,
            &req.content,
            hosts,
            Arc::new(input_files),
            claims.sub,
        )
        .await?;

    Ok(SuccessResponse::new(QuickExecResponse {
        execution_ids: run.execution_ids,
    }))
}

/// Persist a finished execution's captured output and error as downloadable
/// artifacts and link them back to the execution record.
#[tracing::instrument(skip(state), fields(execution_id = %id, user_id = %claims.sub))]
pub async fn save_execution_result(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<SavedResult>, ErrorResponse> {
    let repo = state.execution_repo();
    let mut execution = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Execution not found: {}", id)))?;

    if !execution.status.is_terminal() {
        return Err(ValidationError::InvalidFieldValue {
            field: "status".to_string(),
            reason: "execution has not finished yet".to_string(),
        }
        .into());
    }

    if execution.output_file_id.is_none() {
        if let Some(output) = execution.output.clone().filter(|o| !o.is_empty()) {
            let artifact = NewArtifact {
                original_name: format!("{}_{}_output.txt", execution.script_name, execution.id),
                mime_type: "text/plain".to_string(),
                category: "execution-output".to_string(),
                description: Some(format!("Output of execution {}", execution.id)),
                is_public: false,
                uploaded_by: claims.sub,
            };
            let file = state.artifacts.save(artifact, output.as_bytes()).await?;
            execution.output_file_id = Some(file.id);
        }
    }

    if execution.error_file_id.is_none() {
        if let Some(error) = execution.error.clone().filter(|e| !e.is_empty()) {
            let artifact = NewArtifact {
                original_name: format!("{}_{}_error.txt", execution.script_name, execution.id),
                mime_type: "text/plain".to_string(),
                category: "execution-output".to_string(),
                description: Some(format!("Error of execution {}", execution.id)),
                is_public: false,
                uploaded_by: claims.sub,
            };
            let file = state.artifacts.save(artifact, error.as_bytes()).await?;
            execution.error_file_id = Some(file.id);
        }
    }

    repo.update(&execution).await?;

    Ok(SuccessResponse::new(SavedResult {
        output_file_id: execution.output_file_id,
        error_file_id: execution.error_file_id,
    }))
}
