// Persistence seams for the orchestrators
//
// The orchestrators only need a narrow slice of the repository surface, so
// they work against these traits. Production wires in the sqlx-backed
// implementations below; tests substitute in-memory fakes.

use crate::db::repositories::{DistributionRepository, ExecutionRepository, JobRepository};
use crate::errors::DatabaseError;
use crate::models::{
    DistributionStatus, Execution, ExecutionStatus, FileDistributionDetail, JobStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), DatabaseError>;
    async fn update_execution(&self, execution: &Execution) -> Result<(), DatabaseError>;
    async fn execution_statuses(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ExecutionStatus>, DatabaseError>;
    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait DistributionStore: Send + Sync {
    async fn set_distribution_status(
        &self,
        id: Uuid,
        status: DistributionStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;
    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<(), DatabaseError>;
    async fn insert_detail(&self, detail: &FileDistributionDetail) -> Result<(), DatabaseError>;
    async fn update_detail(&self, detail: &FileDistributionDetail) -> Result<(), DatabaseError>;
}

/// sqlx-backed execution store
pub struct DbExecutionStore {
    executions: ExecutionRepository,
    jobs: JobRepository,
}

impl DbExecutionStore {
    pub fn new(executions: ExecutionRepository, jobs: JobRepository) -> Self {
        Self { executions, jobs }
    }
}

#[async_trait]
impl ExecutionStore for DbExecutionStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), DatabaseError> {
        self.executions.create(execution).await
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), DatabaseError> {
        self.executions.update(execution).await
    }

    async fn execution_statuses(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ExecutionStatus>, DatabaseError> {
        self.executions.statuses_for_job(job_id).await
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), DatabaseError> {
        self.jobs.update_status(job_id, status).await
    }
}

/// sqlx-backed distribution store
pub struct DbDistributionStore {
    distributions: DistributionRepository,
}

impl DbDistributionStore {
    pub fn new(distributions: DistributionRepository) -> Self {
        Self { distributions }
    }
}

#[async_trait]
impl DistributionStore for DbDistributionStore {
    async fn set_distribution_status(
        &self,
        id: Uuid,
        status: DistributionStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.distributions
            .update_status(id, status, started_at, completed_at)
            .await
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<(), DatabaseError> {
        self.distributions.update_progress(id, progress).await
    }

    async fn insert_detail(&self, detail: &FileDistributionDetail) -> Result<(), DatabaseError> {
        self.distributions.create_detail(detail).await
    }

    async fn update_detail(&self, detail: &FileDistributionDetail) -> Result<(), DatabaseError> {
        self.distributions.update_detail(detail).await
    }
}
