// Stored file repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::StoredFile;
use tracing::instrument;
use uuid::Uuid;

const FILE_COLUMNS: &str = r#"
    id, name, original_name, path, size, mime_type, sha256,
    category, description, is_public, uploaded_by, download_count,
    created_at
"#;

/// Repository for uploaded file and artifact metadata
pub struct FileRepository {
    pool: DbPool,
}

impl FileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, file), fields(file_id = %file.id, name = %file.name))]
    pub async fn create(&self, file: &StoredFile) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO stored_files (
                id, name, original_name, path, size, mime_type, sha256,
                category, description, is_public, uploaded_by, download_count,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(file.id)
        .bind(&file.name)
        .bind(&file.original_name)
        .bind(&file.path)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.sha256)
        .bind(&file.category)
        .bind(&file.description)
        .bind(file.is_public)
        .bind(file.uploaded_by)
        .bind(file.download_count)
        .bind(file.created_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(file_id = %file.id, "File record created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredFile>, DatabaseError> {
        let file = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM stored_files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(file)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self, category: Option<&str>) -> Result<Vec<StoredFile>, DatabaseError> {
        let files = match category {
            Some(category) => {
                sqlx::query_as::<_, StoredFile>(&format!(
                    "SELECT {FILE_COLUMNS} FROM stored_files \
                     WHERE category = $1 ORDER BY created_at DESC"
                ))
                .bind(category)
                .fetch_all(self.pool.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredFile>(&format!(
                    "SELECT {FILE_COLUMNS} FROM stored_files ORDER BY created_at DESC"
                ))
                .fetch_all(self.pool.pool())
                .await?
            }
        };

        Ok(files)
    }

    #[instrument(skip(self))]
    pub async fn increment_download_count(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE stored_files SET download_count = download_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM stored_files WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("File not found: {}", id)));
        }

        tracing::info!(file_id = %id, "File record deleted");
        Ok(())
    }
}
