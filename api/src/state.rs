use std::sync::Arc;

use common::auth::{AuthService, JwtService};
use common::config::Settings;
use common::db::repositories::{
    DistributionRepository, ExecutionRepository, FileRepository, HostRepository, JobRepository,
    ScriptRepository, TopologyRepository, UserRepository,
};
use common::db::DbPool;
use common::executor::ScriptRunner;
use common::orchestrator::{
    DbDistributionStore, DbExecutionStore, DistributionOrchestrator, ExecutionOrchestrator,
};
use common::ssh::{SessionFactory, SshSessionFactory};
use common::storage::{ArtifactStore, FsArtifactStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub sessions: Arc<dyn SessionFactory>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub executions: ExecutionOrchestrator,
    pub distributions: DistributionOrchestrator,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: Settings) -> Self {
        let jwt = JwtService::new(&config.auth.jwt_secret, config.auth.jwt_expiration_hours);
        let auth = AuthService::new(jwt.clone(), UserRepository::new(db_pool.clone()));

        let sessions: Arc<dyn SessionFactory> = Arc::new(SshSessionFactory::new(
            std::time::Duration::from_secs(config.ssh.connect_timeout_seconds),
        ));

        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(
            config.artifacts.upload_dir.clone(),
            FileRepository::new(db_pool.clone()),
        ));

        let executions = ExecutionOrchestrator::new(
            Arc::new(ScriptRunner::new(Arc::clone(&sessions))),
            Arc::new(DbExecutionStore::new(
                ExecutionRepository::new(db_pool.clone()),
                JobRepository::new(db_pool.clone()),
            )),
            Arc::clone(&artifacts),
        );

        let distributions = DistributionOrchestrator::new(
            Arc::clone(&sessions),
            Arc::new(DbDistributionStore::new(DistributionRepository::new(
                db_pool.clone(),
            ))),
            config.distribution.clone(),
        );

        Self {
            db_pool,
            config: Arc::new(config),
            jwt,
            auth,
            sessions,
            artifacts,
            executions,
            distributions,
        }
    }

    pub fn host_repo(&self) -> HostRepository {
        HostRepository::new(self.db_pool.clone())
    }

    pub fn script_repo(&self) -> ScriptRepository {
        ScriptRepository::new(self.db_pool.clone())
    }

    pub fn job_repo(&self) -> JobRepository {
        JobRepository::new(self.db_pool.clone())
    }

    pub fn execution_repo(&self) -> ExecutionRepository {
        ExecutionRepository::new(self.db_pool.clone())
    }

    pub fn distribution_repo(&self) -> DistributionRepository {
        DistributionRepository::new(self.db_pool.clone())
    }

    pub fn file_repo(&self) -> FileRepository {
        FileRepository::new(self.db_pool.clone())
    }

    pub fn topology_repo(&self) -> TopologyRepository {
        TopologyRepository::new(self.db_pool.clone())
    }
}
