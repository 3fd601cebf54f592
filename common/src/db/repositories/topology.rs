// Topology repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Business, Cluster, Environment, HostTopology};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

/// Repository for the business / environment / cluster hierarchy
pub struct TopologyRepository {
    pool: DbPool,
}

impl TopologyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Businesses
    // ------------------------------------------------------------------

    #[instrument(skip(self, business), fields(business_id = %business.id))]
    pub async fn create_business(&self, business: &Business) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO businesses (id, name, code, description, owner, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(business.id)
        .bind(&business.name)
        .bind(&business.code)
        .bind(&business.description)
        .bind(&business.owner)
        .bind(business.created_at)
        .bind(business.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_businesses(&self) -> Result<Vec<Business>, DatabaseError> {
        let businesses = sqlx::query_as::<_, Business>(
            "SELECT id, name, code, description, owner, created_at, updated_at \
             FROM businesses ORDER BY name",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(businesses)
    }

    #[instrument(skip(self))]
    pub async fn delete_business(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM businesses WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Business not found: {}",
                id
            )));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Environments
    // ------------------------------------------------------------------

    #[instrument(skip(self, environment), fields(environment_id = %environment.id))]
    pub async fn create_environment(&self, environment: &Environment) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO environments (id, name, code, business_id, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(environment.id)
        .bind(&environment.name)
        .bind(&environment.code)
        .bind(environment.business_id)
        .bind(&environment.description)
        .bind(environment.created_at)
        .bind(environment.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_environments(&self) -> Result<Vec<Environment>, DatabaseError> {
        let environments = sqlx::query_as::<_, Environment>(
            "SELECT id, name, code, business_id, description, created_at, updated_at \
             FROM environments ORDER BY name",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(environments)
    }

    #[instrument(skip(self))]
    pub async fn delete_environment(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM environments WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Environment not found: {}",
                id
            )));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    #[instrument(skip(self, cluster), fields(cluster_id = %cluster.id))]
    pub async fn create_cluster(&self, cluster: &Cluster) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO clusters (id, name, code, environment_id, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(cluster.id)
        .bind(&cluster.name)
        .bind(&cluster.code)
        .bind(cluster.environment_id)
        .bind(&cluster.description)
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_clusters(&self) -> Result<Vec<Cluster>, DatabaseError> {
        let clusters = sqlx::query_as::<_, Cluster>(
            "SELECT id, name, code, environment_id, description, created_at, updated_at \
             FROM clusters ORDER BY name",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(clusters)
    }

    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Cluster not found: {}", id)));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Host assignments
    // ------------------------------------------------------------------

    /// Assign a host to a cluster, replacing any existing assignment
    #[instrument(skip(self))]
    pub async fn assign_host(&self, host_id: Uuid, cluster_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO host_topology (id, host_id, cluster_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (host_id)
            DO UPDATE SET cluster_id = EXCLUDED.cluster_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(host_id)
        .bind(cluster_id)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unassign_host(&self, host_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM host_topology WHERE host_id = $1")
            .bind(host_id)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_assignments(&self) -> Result<Vec<HostTopology>, DatabaseError> {
        let assignments = sqlx::query_as::<_, HostTopology>(
            "SELECT id, host_id, cluster_id, created_at FROM host_topology",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(assignments)
    }
}
