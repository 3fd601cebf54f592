// Script repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Script;
use tracing::instrument;
use uuid::Uuid;

/// Repository for script-related database operations
pub struct ScriptRepository {
    pool: DbPool,
}

impl ScriptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, script), fields(script_id = %script.id, name = %script.name))]
    pub async fn create(&self, script: &Script) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO scripts (
                id, name, content, kind, description, created_by,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(script.id)
        .bind(&script.name)
        .bind(&script.content)
        .bind(script.kind.to_string())
        .bind(&script.description)
        .bind(script.created_by)
        .bind(script.created_at)
        .bind(script.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(script_id = %script.id, "Script created");
        Ok(())
    }

    #[instrument(skip(self, script), fields(script_id = %script.id))]
    pub async fn update(&self, script: &Script) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE scripts
            SET name = $2,
                content = $3,
                kind = $4,
                description = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(script.id)
        .bind(&script.name)
        .bind(&script.content)
        .bind(script.kind.to_string())
        .bind(&script.description)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Script not found: {}",
                script.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Script>, DatabaseError> {
        let script = sqlx::query_as::<_, Script>(
            r#"
            SELECT id, name, content, kind, description, created_by,
                   created_at, updated_at
            FROM scripts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(script)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Script>, DatabaseError> {
        let scripts = sqlx::query_as::<_, Script>(
            r#"
            SELECT id, name, content, kind, description, created_by,
                   created_at, updated_at
            FROM scripts
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(scripts)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM scripts WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Script not found: {}", id)));
        }

        tracing::info!(script_id = %id, "Script deleted");
        Ok(())
    }
}
