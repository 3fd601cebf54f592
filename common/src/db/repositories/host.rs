// Host repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Host, HostStatus};
use tracing::instrument;
use uuid::Uuid;

const HOST_COLUMNS: &str = r#"
    id, name, address, port, os, status, description, tags,
    auth_method, username, password, private_key, passphrase,
    created_at, updated_at
"#;

/// Repository for host-related database operations
pub struct HostRepository {
    pool: DbPool,
}

impl HostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, host), fields(host_id = %host.id, name = %host.name))]
    pub async fn create(&self, host: &Host) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO hosts (
                id, name, address, port, os, status, description, tags,
                auth_method, username, password, private_key, passphrase,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(host.id)
        .bind(&host.name)
        .bind(&host.address)
        .bind(host.port)
        .bind(&host.os)
        .bind(host.status.to_string())
        .bind(&host.description)
        .bind(&host.tags)
        .bind(host.auth_method.to_string())
        .bind(&host.username)
        .bind(&host.password)
        .bind(&host.private_key)
        .bind(&host.passphrase)
        .bind(host.created_at)
        .bind(host.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(host_id = %host.id, "Host created");
        Ok(())
    }

    /// Update a host. Credential columns are only overwritten when the caller
    /// supplies new values, so a plain edit never wipes stored secrets.
    #[instrument(skip(self, host), fields(host_id = %host.id))]
    pub async fn update(&self, host: &Host) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE hosts
            SET name = $2,
                address = $3,
                port = $4,
                os = $5,
                description = $6,
                tags = $7,
                auth_method = $8,
                username = $9,
                password = COALESCE($10, password),
                private_key = COALESCE($11, private_key),
                passphrase = COALESCE($12, passphrase),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(host.id)
        .bind(&host.name)
        .bind(&host.address)
        .bind(host.port)
        .bind(&host.os)
        .bind(&host.description)
        .bind(&host.tags)
        .bind(host.auth_method.to_string())
        .bind(&host.username)
        .bind(&host.password)
        .bind(&host.private_key)
        .bind(&host.passphrase)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Host not found: {}",
                host.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Host>, DatabaseError> {
        let host = sqlx::query_as::<_, Host>(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(host)
    }

    #[instrument(skip(self))]
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Host>, DatabaseError> {
        let hosts = sqlx::query_as::<_, Host>(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts WHERE id = ANY($1) ORDER BY name"
        ))
        .bind(ids)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(hosts)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Host>, DatabaseError> {
        let hosts = sqlx::query_as::<_, Host>(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts ORDER BY name"
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(hosts)
    }

    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Host>, DatabaseError> {
        let host = sqlx::query_as::<_, Host>(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(host)
    }

    /// Record the last observed reachability of a host
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: HostStatus) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE hosts SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Host not found: {}", id)));
        }

        tracing::debug!(host_id = %id, status = %status, "Host status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Host not found: {}", id)));
        }

        tracing::info!(host_id = %id, "Host deleted");
        Ok(())
    }
}
