// Job repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Job, JobStatus};
use tracing::instrument;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, name, script_id, host_ids, status, timeout_seconds,
    save_output, save_error, output_category, input_file_ids,
    created_by, created_at, updated_at
"#;

/// Repository for job-related database operations
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, name = %job.name))]
    pub async fn create(&self, job: &Job) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, script_id, host_ids, status, timeout_seconds,
                save_output, save_error, output_category, input_file_ids,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.script_id)
        .bind(&job.host_ids)
        .bind(job.status.to_string())
        .bind(job.timeout_seconds)
        .bind(job.save_output)
        .bind(job.save_error)
        .bind(&job.output_category)
        .bind(&job.input_file_ids)
        .bind(job.created_by)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(job_id = %job.id, "Job created");
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn update(&self, job: &Job) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = $2,
                script_id = $3,
                host_ids = $4,
                timeout_seconds = $5,
                save_output = $6,
                save_error = $7,
                output_category = $8,
                input_file_ids = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.script_id)
        .bind(&job.host_ids)
        .bind(job.timeout_seconds)
        .bind(job.save_output)
        .bind(job.save_error)
        .bind(&job.output_category)
        .bind(&job.input_file_ids)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Job not found: {}", job.id)));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, DatabaseError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(job)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Job>, DatabaseError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(jobs)
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Job not found: {}", id)));
        }

        tracing::debug!(job_id = %id, status = %status, "Job status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Job not found: {}", id)));
        }

        tracing::info!(job_id = %id, "Job deleted");
        Ok(())
    }
}
