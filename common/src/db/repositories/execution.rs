// Execution repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Execution, ExecutionStatus};
use tracing::instrument;
use uuid::Uuid;

const EXECUTION_COLUMNS: &str = r#"
    id, job_id, host_id, status, output, error,
    started_at, completed_at, executed_by,
    job_name, script_name, script_content, script_kind,
    quick_exec, output_file_id, error_file_id, created_at
"#;

/// Filter for querying executions
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub job_id: Option<Uuid>,
    pub host_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<i64>,
}

/// Repository for execution-related database operations
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, execution), fields(execution_id = %execution.id, host_id = %execution.host_id))]
    pub async fn create(&self, execution: &Execution) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_id, host_id, status, output, error,
                started_at, completed_at, executed_by,
                job_name, script_name, script_content, script_kind,
                quick_exec, output_file_id, error_file_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.host_id)
        .bind(execution.status.to_string())
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.executed_by)
        .bind(&execution.job_name)
        .bind(&execution.script_name)
        .bind(&execution.script_content)
        .bind(execution.script_kind.to_string())
        .bind(execution.quick_exec)
        .bind(execution.output_file_id)
        .bind(execution.error_file_id)
        .bind(execution.created_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(execution_id = %execution.id, "Execution created");
        Ok(())
    }

    /// Persist the mutable part of an execution after a state transition
    #[instrument(skip(self, execution), fields(execution_id = %execution.id, status = %execution.status))]
    pub async fn update(&self, execution: &Execution) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = $2,
                output = $3,
                error = $4,
                started_at = $5,
                completed_at = $6,
                output_file_id = $7,
                error_file_id = $8
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.output_file_id)
        .bind(execution.error_file_id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Execution not found: {}",
                execution.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Execution>, DatabaseError> {
        let execution = sqlx::query_as::<_, Execution>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(execution)
    }

    #[instrument(skip(self))]
    pub async fn find_with_filter(
        &self,
        filter: ExecutionFilter,
    ) -> Result<Vec<Execution>, DatabaseError> {
        let mut query = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE 1=1");
        let mut param_count = 1;

        if filter.job_id.is_some() {
            query.push_str(&format!(" AND job_id = ${}", param_count));
            param_count += 1;
        }
        if filter.host_id.is_some() {
            query.push_str(&format!(" AND host_id = ${}", param_count));
            param_count += 1;
        }
        if filter.status.is_some() {
            query.push_str(&format!(" AND status = ${}", param_count));
        }

        query.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query_builder = sqlx::query_as::<_, Execution>(&query);
        if let Some(job_id) = filter.job_id {
            query_builder = query_builder.bind(job_id);
        }
        if let Some(host_id) = filter.host_id {
            query_builder = query_builder.bind(host_id);
        }
        if let Some(status) = filter.status {
            query_builder = query_builder.bind(status.to_string());
        }

        let executions = query_builder.fetch_all(self.pool.pool()).await?;

        tracing::debug!(count = executions.len(), "Found executions with filter");
        Ok(executions)
    }

    #[instrument(skip(self))]
    pub async fn find_by_job_id(&self, job_id: Uuid) -> Result<Vec<Execution>, DatabaseError> {
        let executions = sqlx::query_as::<_, Execution>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions WHERE job_id = $1 ORDER BY created_at DESC"
        ))
        .bind(job_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(executions)
    }

    /// Fetch only the status column for every execution of a job.
    /// Used by the status rollup, which never needs the output payloads.
    #[instrument(skip(self))]
    pub async fn statuses_for_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ExecutionStatus>, DatabaseError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT status FROM executions WHERE job_id = $1")
                .bind(job_id)
                .fetch_all(self.pool.pool())
                .await?;

        rows.into_iter()
            .map(|(s,)| {
                s.parse::<ExecutionStatus>()
                    .map_err(DatabaseError::QueryFailed)
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM executions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Execution not found: {}",
                id
            )));
        }

        tracing::info!(execution_id = %id, "Execution deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_by_job_id(&self, job_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM executions WHERE job_id = $1")
            .bind(job_id)
            .execute(self.pool.pool())
            .await?;

        let deleted = result.rows_affected();
        tracing::info!(job_id = %job_id, deleted_count = deleted, "Executions deleted for job");
        Ok(deleted)
    }
}
