// File distribution repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{DistributionStatus, FileDistribution, FileDistributionDetail};
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

const DISTRIBUTION_COLUMNS: &str = r#"
    id, file_id, host_ids, target_path, status, progress,
    started_at, completed_at, created_by, created_at
"#;

const DETAIL_COLUMNS: &str = r#"
    id, distribution_id, host_id, status, output, error,
    started_at, completed_at, created_at
"#;

/// Repository for file distribution records and their per-host details
pub struct DistributionRepository {
    pool: DbPool,
}

impl DistributionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, distribution), fields(distribution_id = %distribution.id))]
    pub async fn create(&self, distribution: &FileDistribution) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO file_distributions (
                id, file_id, host_ids, target_path, status, progress,
                started_at, completed_at, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(distribution.id)
        .bind(distribution.file_id)
        .bind(&distribution.host_ids)
        .bind(&distribution.target_path)
        .bind(distribution.status.to_string())
        .bind(distribution.progress)
        .bind(distribution.started_at)
        .bind(distribution.completed_at)
        .bind(distribution.created_by)
        .bind(distribution.created_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(distribution_id = %distribution.id, "Distribution created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<FileDistribution>, DatabaseError> {
        let distribution = sqlx::query_as::<_, FileDistribution>(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM file_distributions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(distribution)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<FileDistribution>, DatabaseError> {
        let distributions = sqlx::query_as::<_, FileDistribution>(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM file_distributions ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(distributions)
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: DistributionStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE file_distributions
            SET status = $2,
                started_at = COALESCE($3, started_at),
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(started_at)
        .bind(completed_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Distribution not found: {}",
                id
            )));
        }

        tracing::debug!(distribution_id = %id, status = %status, "Distribution status updated");
        Ok(())
    }

    /// Record overall progress as a 0-100 percentage
    #[instrument(skip(self))]
    pub async fn update_progress(&self, id: Uuid, progress: i32) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE file_distributions SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(progress)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    #[instrument(skip(self, detail), fields(detail_id = %detail.id, host_id = %detail.host_id))]
    pub async fn create_detail(
        &self,
        detail: &FileDistributionDetail,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO file_distribution_details (
                id, distribution_id, host_id, status, output, error,
                started_at, completed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(detail.id)
        .bind(detail.distribution_id)
        .bind(detail.host_id)
        .bind(detail.status.to_string())
        .bind(&detail.output)
        .bind(&detail.error)
        .bind(detail.started_at)
        .bind(detail.completed_at)
        .bind(detail.created_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self, detail), fields(detail_id = %detail.id, status = %detail.status))]
    pub async fn update_detail(
        &self,
        detail: &FileDistributionDetail,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE file_distribution_details
            SET status = $2,
                output = $3,
                error = $4,
                started_at = $5,
                completed_at = $6
            WHERE id = $1
            "#,
        )
        .bind(detail.id)
        .bind(detail.status.to_string())
        .bind(&detail.output)
        .bind(&detail.error)
        .bind(detail.started_at)
        .bind(detail.completed_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Distribution detail not found: {}",
                detail.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_details(
        &self,
        distribution_id: Uuid,
    ) -> Result<Vec<FileDistributionDetail>, DatabaseError> {
        let details = sqlx::query_as::<_, FileDistributionDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM file_distribution_details \
             WHERE distribution_id = $1 ORDER BY created_at"
        ))
        .bind(distribution_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(details)
    }

    /// Number of distribution records referencing a stored file
    #[instrument(skip(self))]
    pub async fn count_for_file(&self, file_id: Uuid) -> Result<i64, DatabaseError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM file_distributions WHERE file_id = $1")
                .bind(file_id)
                .fetch_one(self.pool.pool())
                .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        // details cascade via FK
        let result = sqlx::query("DELETE FROM file_distributions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Distribution not found: {}",
                id
            )));
        }

        tracing::info!(distribution_id = %id, "Distribution deleted");
        Ok(())
    }
}
