use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use common::errors::{DatabaseError, ValidationError};
use common::models::{Job, JobStatus, UserClaims};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    pub script_id: Uuid,
    pub host_ids: Vec<Uuid>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: i32,
    #[serde(default)]
    pub save_output: bool,
    #[serde(default)]
    pub save_error: bool,
    pub output_category: Option<String>,
    #[serde(default)]
    pub input_file_ids: Vec<Uuid>,
}

fn default_timeout() -> i32 {
    300
}

#[derive(Debug, Serialize)]
pub struct ExecuteJobResponse {
    pub job_id: Uuid,
    pub execution_ids: Vec<Uuid>,
}

fn validate_job_request(req: &CreateJobRequest) -> Result<(), ValidationError> {
    if req.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()));
    }
    if req.host_ids.is_empty() {
        return Err(ValidationError::MissingField("host_ids".to_string()));
    }
    if req.timeout_seconds <= 0 {
        return Err(ValidationError::InvalidFieldValue {
            field: "timeout_seconds".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

#[tracing::instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Job>>, ErrorResponse> {
    let jobs = state.job_repo().find_all().await?;
    Ok(SuccessResponse::new(jobs))
}

#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<Job>, ErrorResponse> {
    let job = state
        .job_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Job not found: {}", id)))?;
    Ok(SuccessResponse::new(job))
}

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<CreateJobRequest>,
) -> Result<SuccessResponse<Job>, ErrorResponse> {
    validate_job_request(&req)?;

    // The referenced script must exist at creation time
    state
        .script_repo()
        .find_by_id(req.script_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Script not found: {}", req.script_id)))?;

    let now = Utc::now();
    let job = Job {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        script_id: req.script_id,
        host_ids: req.host_ids,
        status: JobStatus::Pending,
        timeout_seconds: req.timeout_seconds,
        save_output: req.save_output,
        save_error: req.save_error,
        output_category: req.output_category,
        input_file_ids: req.input_file_ids,
        created_by: claims.sub,
        created_at: now,
        updated_at: now,
    };

    state.job_repo().create(&job).await?;
    Ok(SuccessResponse::new(job))
}

#[tracing::instrument(skip(state, req))]
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateJobRequest>,
) -> Result<SuccessResponse<Job>, ErrorResponse> {
    validate_job_request(&req)?;

    let repo = state.job_repo();
    let mut job = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Job not found: {}", id)))?;

    job.name = req.name.trim().to_string();
    job.script_id = req.script_id;
    job.host_ids = req.host_ids;
    job.timeout_seconds = req.timeout_seconds;
    job.save_output = req.save_output;
    job.save_error = req.save_error;
    job.output_category = req.output_category;
    job.input_file_ids = req.input_file_ids;

    repo.update(&job).await?;
    Ok(SuccessResponse::new(job))
}

/// Delete a job and its execution history, cascading any artifact files the
/// executions saved
#[tracing::instrument(skip(state))]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    let repo = state.execution_repo();
    for execution in repo.find_by_job_id(id).await? {
        crate::handlers::executions::delete_saved_artifacts(&state, &execution).await?;
    }

    let deleted = repo.delete_by_job_id(id).await?;
    state.job_repo().delete(id).await?;
    Ok(SuccessResponse::new(
        serde_json::json!({ "deleted": id, "executions_deleted": deleted }),
    ))
}

/// Launch a job against all of its target hosts. Returns as soon as the
/// per-host executions are created; results land asynchronously.
#[tracing::instrument(skip(state), fields(job_id = %id, user_id = %claims.sub))]
pub async fn execute_job(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<ExecuteJobResponse>, ErrorResponse> {
    let job = state
        .job_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Job not found: {}", id)))?;

    let script = state
        .script_repo()
        .find_by_id(job.script_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Script not found: {}", job.script_id)))?;

    let hosts = state.host_repo().find_by_ids(&job.host_ids).await?;
    if hosts.len() != job.host_ids.len() {
        return Err(ValidationError::InvalidFieldValue {
            field: "host_ids".to_string(),
            reason: "some hosts no longer exist".to_string(),
        }
        .into());
    }

    // Input files are read once and shared across all host tasks
    let mut input_files = Vec::with_capacity(job.input_file_ids.len());
    let file_repo = state.file_repo();
    for file_id in &job.input_file_ids {
        let file = file_repo
            .find_by_id(*file_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", file_id)))?;
        let data = state.artifacts.load(&file).await?;
        input_files.push((file.original_name.clone(), data));
    }

    let run = state
        .executions
        .launch(&job, &script, hosts, Arc::new(input_files), claims.sub)
        .await?;

    Ok(SuccessResponse::new(ExecuteJobResponse {
        job_id: job.id,
        execution_ids: run.execution_ids,
    }))
}
