use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Extension,
};
use common::errors::{DatabaseError, ValidationError};
use common::models::{StoredFile, UserClaims};
use common::storage::NewArtifact;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileListQuery {
    pub category: Option<String>,
}

#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    mime_type: Option<String>,
    data: Option<Vec<u8>>,
    category: Option<String>,
    description: Option<String>,
    is_public: bool,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ValidationError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ValidationError::InvalidFieldValue {
            field: "multipart".to_string(),
            reason: e.to_string(),
        })?
    {
        match field.name().unwrap_or("") {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.mime_type = field.content_type().map(str::to_string);
                form.data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ValidationError::InvalidFieldValue {
                            field: "file".to_string(),
                            reason: e.to_string(),
                        })?
                        .to_vec(),
                );
            }
            "category" => {
                form.category = field.text().await.ok().filter(|c| !c.is_empty());
            }
            "description" => {
                form.description = field.text().await.ok().filter(|d| !d.is_empty());
            }
            "is_public" => {
                form.is_public = field.text().await.ok().as_deref() == Some("true");
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Upload a file as multipart form data. The `file` part carries the bytes;
/// optional `category`, `description` and `is_public` parts carry metadata.
#[tracing::instrument(skip(state, multipart), fields(user_id = %claims.sub))]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    multipart: Multipart,
) -> Result<SuccessResponse<StoredFile>, ErrorResponse> {
    let form = read_upload_form(multipart).await?;

    let data = form
        .data
        .ok_or_else(|| ValidationError::MissingField("file".to_string()))?;
    if data.is_empty() {
        return Err(ValidationError::InvalidFieldValue {
            field: "file".to_string(),
            reason: "file is empty".to_string(),
        }
        .into());
    }
    let original_name = form
        .file_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ValidationError::MissingField("filename".to_string()))?;

    let artifact = NewArtifact {
        original_name,
        mime_type: form
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        category: form.category.unwrap_or_else(|| "general".to_string()),
        description: form.description,
        is_public: form.is_public,
        uploaded_by: claims.sub,
    };

    let file = state.artifacts.save(artifact, &data).await?;
    Ok(SuccessResponse::new(file))
}

#[tracing::instrument(skip(state))]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileListQuery>,
) -> Result<SuccessResponse<Vec<StoredFile>>, ErrorResponse> {
    let files = state
        .file_repo()
        .find_all(query.category.as_deref())
        .await?;
    Ok(SuccessResponse::new(files))
}

#[tracing::instrument(skip(state))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<StoredFile>, ErrorResponse> {
    let file = state
        .file_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", id)))?;
    Ok(SuccessResponse::new(file))
}

/// Download a file's bytes under its original name
#[tracing::instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let repo = state.file_repo();
    let file = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", id)))?;

    let data = state.artifacts.load(&file).await?;
    repo.increment_download_count(file.id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.original_name.replace('"', "")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    Ok((StatusCode::OK, headers, data))
}

/// Delete a file. Refused while any distribution still references it, so
/// distribution history keeps pointing at a real record.
#[tracing::instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    let file = state
        .file_repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("File not found: {}", id)))?;

    let references = state.distribution_repo().count_for_file(id).await?;
    if references > 0 {
        return Err(ValidationError::ConstraintViolation(format!(
            "File is referenced by {} distribution(s); delete those first",
            references
        ))
        .into());
    }

    state.artifacts.delete(&file).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}
