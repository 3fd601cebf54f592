use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use common::errors::{DatabaseError, ValidationError};
use common::import_export::{export_hosts_csv, import_hosts_csv};
use common::models::{AuthMethod, Host, HostStatus, ProbeReport, UserClaims};
use common::ssh::probe_host;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHostRequest {
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: i32,
    pub os: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub auth_method: AuthMethod,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

fn default_port() -> i32 {
    22
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

fn validate_host_request(req: &CreateHostRequest) -> Result<(), ValidationError> {
    if req.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()));
    }
    if req.address.trim().is_empty() {
        return Err(ValidationError::MissingField("address".to_string()));
    }
    if req.port <= 0 || req.port > 65535 {
        return Err(ValidationError::InvalidFieldValue {
            field: "port".to_string(),
            reason: format!("{} is out of range", req.port),
        });
    }
    Ok(())
}

#[tracing::instrument(skip(state))]
pub async fn list_hosts(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Host>>, ErrorResponse> {
    let hosts = state.host_repo().find_all().await?;
    Ok(SuccessResponse::new(hosts))
}

#[tracing::instrument(skip(state))]
pub async fn get_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<Host>, ErrorResponse> {
    let host = state
        .host_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Host not found: {}", id)))?;
    Ok(SuccessResponse::new(host))
}

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_host(
    State(state): State<AppState>,
    Json(req): Json<CreateHostRequest>,
) -> Result<SuccessResponse<Host>, ErrorResponse> {
    validate_host_request(&req)?;

    let now = Utc::now();
    let host = Host {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        address: req.address.trim().to_string(),
        port: req.port,
        os: req.os,
        status: HostStatus::Unknown,
        description: req.description,
        tags: req.tags,
        auth_method: req.auth_method,
        username: req.username,
        password: req.password,
        private_key: req.private_key,
        passphrase: req.passphrase,
        created_at: now,
        updated_at: now,
    };

    state.host_repo().create(&host).await?;
    Ok(SuccessResponse::new(host))
}

#[tracing::instrument(skip(state, req))]
pub async fn update_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateHostRequest>,
) -> Result<SuccessResponse<Host>, ErrorResponse> {
    validate_host_request(&req)?;

    let repo = state.host_repo();
    let mut host = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Host not found: {}", id)))?;

    host.name = req.name.trim().to_string();
    host.address = req.address.trim().to_string();
    host.port = req.port;
    host.os = req.os;
    host.description = req.description;
    host.tags = req.tags;
    host.auth_method = req.auth_method;
    host.username = req.username;
    // Blank credential fields leave the stored values untouched
    host.password = req.password.filter(|p| !p.is_empty());
    host.private_key = req.private_key.filter(|k| !k.is_empty());
    host.passphrase = req.passphrase.filter(|p| !p.is_empty());

    repo.update(&host).await?;

    let host = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Host not found: {}", id)))?;
    Ok(SuccessResponse::new(host))
}

#[tracing::instrument(skip(state))]
pub async fn delete_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.host_repo().delete(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}

/// Probe a host's SSH connectivity and record the observed status
#[tracing::instrument(skip(state))]
pub async fn test_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<ProbeReport>, ErrorResponse> {
    let repo = state.host_repo();
    let host = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Host not found: {}", id)))?;

    let report = probe_host(state.sessions.as_ref(), &host).await;

    let observed = if report.success {
        HostStatus::Online
    } else {
        HostStatus::Offline
    };
    if observed != host.status {
        repo.update_status(host.id, observed).await?;
    }

    Ok(SuccessResponse::new(report))
}

/// Create hosts in bulk from a JSON array. Hosts whose names already exist
/// are skipped rather than overwritten.
#[tracing::instrument(skip(state, reqs), fields(user_id = %claims.sub, count = reqs.len()))]
pub async fn batch_create_hosts(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(reqs): Json<Vec<CreateHostRequest>>,
) -> Result<SuccessResponse<ImportSummary>, ErrorResponse> {
    for req in &reqs {
        validate_host_request(req)?;
    }

    let repo = state.host_repo();
    let mut imported = 0;
    let mut skipped = 0;
    for req in reqs {
        if repo.find_by_name(req.name.trim()).await?.is_some() {
            skipped += 1;
            continue;
        }

        let now = Utc::now();
        let host = Host {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            address: req.address.trim().to_string(),
            port: req.port,
            os: req.os,
            status: HostStatus::Unknown,
            description: req.description,
            tags: req.tags,
            auth_method: req.auth_method,
            username: req.username,
            password: req.password,
            private_key: req.private_key,
            passphrase: req.passphrase,
            created_at: now,
            updated_at: now,
        };
        repo.create(&host).await?;
        imported += 1;
    }

    tracing::info!(imported = imported, skipped = skipped, "Batch host creation finished");
    Ok(SuccessResponse::new(ImportSummary { imported, skipped }))
}

/// Import hosts from an uploaded CSV body. Hosts whose names already exist
/// are skipped rather than overwritten.
#[tracing::instrument(skip(state, body), fields(user_id = %claims.sub))]
pub async fn import_hosts(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    body: String,
) -> Result<SuccessResponse<ImportSummary>, ErrorResponse> {
    let hosts = import_hosts_csv(body.as_bytes())?;

    let repo = state.host_repo();
    let mut imported = 0;
    let mut skipped = 0;
    for host in hosts {
        if repo.find_by_name(&host.name).await?.is_some() {
            skipped += 1;
            continue;
        }
        repo.create(&host).await?;
        imported += 1;
    }

    tracing::info!(imported = imported, skipped = skipped, "Host import finished");
    Ok(SuccessResponse::new(ImportSummary { imported, skipped }))
}

/// Export all hosts as CSV. Credentials never leave the database.
#[tracing::instrument(skip(state))]
pub async fn export_hosts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let hosts = state.host_repo().find_all().await?;
    let csv = export_hosts_csv(&hosts)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"hosts.csv\"",
            ),
        ],
        csv,
    ))
}
