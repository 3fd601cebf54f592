// Execution orchestrator: fans a script out to every target host

use crate::errors::{DatabaseError, SshError};
use crate::executor::ScriptRunner;
use crate::models::{Execution, ExecutionStatus, Host, Job, JobStatus, Script, ScriptKind};
use crate::orchestrator::ExecutionStore;
use crate::storage::{ArtifactStore, NewArtifact};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// What a job asked to keep of each per-host result. Quick executions save
/// nothing automatically; the save endpoint covers them after the fact.
#[derive(Clone, Default)]
struct SavePolicy {
    save_output: bool,
    save_error: bool,
    category: Option<String>,
}

impl SavePolicy {
    fn for_job(job: &Job) -> Self {
        Self {
            save_output: job.save_output,
            save_error: job.save_error,
            category: job.output_category.clone(),
        }
    }
}

/// A launched fan-out. The handle resolves when every per-host task has
/// finished; callers that only need fire-and-forget drop it.
pub struct LaunchedRun {
    pub execution_ids: Vec<Uuid>,
    pub handle: JoinHandle<()>,
}

/// Derive the aggregate job status from its execution statuses.
///
/// Any non-terminal execution keeps the job running. Once everything is
/// terminal, a clean sweep is completed, a total loss is failed, and any mix
/// is partial_failed. Idempotent: recomputing on settled inputs is a no-op.
pub fn rollup_status(statuses: &[ExecutionStatus]) -> JobStatus {
    if statuses.iter().any(|s| !s.is_terminal()) {
        return JobStatus::Running;
    }

    let failed = statuses
        .iter()
        .filter(|s| **s == ExecutionStatus::Failed)
        .count();

    if failed == 0 {
        JobStatus::Completed
    } else if failed == statuses.len() {
        JobStatus::Failed
    } else {
        JobStatus::PartialFailed
    }
}

/// Runs one script across N hosts, one concurrent task per host with no
/// admission cap, recording per-host outcomes and rolling the aggregate job
/// status up as each task settles.
#[derive(Clone)]
pub struct ExecutionOrchestrator {
    runner: Arc<ScriptRunner>,
    store: Arc<dyn ExecutionStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ExecutionOrchestrator {
    pub fn new(
        runner: Arc<ScriptRunner>,
        store: Arc<dyn ExecutionStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            runner,
            store,
            artifacts,
        }
    }

    /// Launch a persisted job against its resolved hosts.
    ///
    /// Execution rows are inserted as pending and the job is marked running
    /// before any task starts, so observers never see results without a
    /// launch record.
    #[instrument(skip(self, job, script, hosts, input_files), fields(job_id = %job.id, hosts = hosts.len()))]
    pub async fn launch(
        &self,
        job: &Job,
        script: &Script,
        hosts: Vec<Host>,
        input_files: Arc<Vec<(String, Vec<u8>)>>,
        executed_by: Uuid,
    ) -> Result<LaunchedRun, DatabaseError> {
        self.store
            .set_job_status(job.id, JobStatus::Running)
            .await?;

        let mut pairs = Vec::with_capacity(hosts.len());
        for host in hosts {
            let execution = Execution::new_for_job(job, script, host.id, executed_by);
            self.store.insert_execution(&execution).await?;
            pairs.push((execution, host));
        }

        info!(job_id = %job.id, executions = pairs.len(), "Job launched");
        Ok(self.spawn_all(pairs, input_files, Some(job.id), SavePolicy::for_job(job)))
    }

    /// Launch an ad-hoc script without a persisted job. No aggregate rollup:
    /// there is no parent record to roll up into.
    #[instrument(skip(self, content, hosts, input_files), fields(hosts = hosts.len(), kind = %kind))]
    pub async fn launch_quick(
        &self,
        name: &str,
        kind: ScriptKind,
        content: &str,
        hosts: Vec<Host>,
        input_files: Arc<Vec<(String, Vec<u8>)>>,
        executed_by: Uuid,
    ) -> Result<LaunchedRun, DatabaseError> {
        let mut pairs = Vec::with_capacity(hosts.len());
        for host in hosts {
            let execution = Execution::new_quick(name, kind, content, host.id, executed_by);
            self.store.insert_execution(&execution).await?;
            pairs.push((execution, host));
        }

        info!(executions = pairs.len(), "Quick execution launched");
        Ok(self.spawn_all(pairs, input_files, None, SavePolicy::default()))
    }

    fn spawn_all(
        &self,
        pairs: Vec<(Execution, Host)>,
        input_files: Arc<Vec<(String, Vec<u8>)>>,
        job_id: Option<Uuid>,
        policy: SavePolicy,
    ) -> LaunchedRun {
        let execution_ids = pairs.iter().map(|(e, _)| e.id).collect();

        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            for (execution, host) in pairs {
                let orch = orchestrator.clone();
                let files = Arc::clone(&input_files);
                let policy = policy.clone();
                tasks.spawn(async move {
                    orch.run_one(execution, host, files, policy).await;
                    // Each settling task re-derives the aggregate, so the
                    // job status is current even while siblings still run
                    if let Some(job_id) = job_id {
                        orch.rollup(job_id).await;
                    }
                });
            }
            while tasks.join_next().await.is_some() {}
        });

        LaunchedRun {
            execution_ids,
            handle,
        }
    }

    async fn run_one(
        &self,
        mut execution: Execution,
        host: Host,
        input_files: Arc<Vec<(String, Vec<u8>)>>,
        policy: SavePolicy,
    ) {
        // A host with incomplete credentials fails before any connection
        // attempt, so a misconfigured fleet never burns network timeouts
        if let Some(gap) = host.credential_gap() {
            execution.status = ExecutionStatus::Failed;
            execution.error = Some(gap.to_string());
            execution.completed_at = Some(Utc::now());
            crate::telemetry::record_execution_failed(&host.id);
            info!(execution_id = %execution.id, host = %host.name, error = %gap, "Execution failed");
            if let Err(e) = self.store.update_execution(&execution).await {
                error!(execution_id = %execution.id, error = %e, "Failed to record execution result");
            }
            return;
        }

        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        if let Err(e) = self.store.update_execution(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to mark execution running");
        }

        let result = self
            .runner
            .execute_with_files(&host, execution.script_kind, &execution.script_content, &input_files)
            .await;

        match result {
            Ok(output) => {
                execution.status = ExecutionStatus::Completed;
                execution.output = Some(output.combined());
                crate::telemetry::record_execution_completed(&host.id);
                info!(execution_id = %execution.id, host = %host.name, "Execution completed");
            }
            Err(SshError::RemoteCommand {
                exit_status,
                stdout,
                stderr,
            }) => {
                execution.status = ExecutionStatus::Failed;
                let mut output = stdout;
                output.push_str(&stderr);
                execution.output = Some(output);
                execution.error = Some(format!("Command exited with status {}", exit_status));
                info!(
                    execution_id = %execution.id,
                    host = %host.name,
                    exit_status = exit_status,
                    "Execution failed"
                );
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                info!(execution_id = %execution.id, host = %host.name, error = %e, "Execution failed");
            }
        }

        if execution.status == ExecutionStatus::Failed {
            crate::telemetry::record_execution_failed(&host.id);
        }
        execution.completed_at = Some(Utc::now());
        if let Some(started) = execution.started_at {
            let elapsed = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
            crate::telemetry::record_execution_duration(elapsed);
        }
        self.persist_requested_artifacts(&mut execution, &policy).await;
        if let Err(e) = self.store.update_execution(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to record execution result");
        }
    }

    /// Save captured output and error as artifact files when the job asked
    /// for them. A storage failure never fails the execution itself; the
    /// transcript still lands in the execution row.
    async fn persist_requested_artifacts(&self, execution: &mut Execution, policy: &SavePolicy) {
        let category = policy
            .category
            .clone()
            .unwrap_or_else(|| "execution-output".to_string());

        if policy.save_output {
            if let Some(output) = execution.output.clone().filter(|o| !o.is_empty()) {
                let artifact = NewArtifact {
                    original_name: format!("{}_{}_output.txt", execution.script_name, execution.id),
                    mime_type: "text/plain".to_string(),
                    category: category.clone(),
                    description: Some(format!("Output of execution {}", execution.id)),
                    is_public: false,
                    uploaded_by: execution.executed_by,
                };
                match self.artifacts.save(artifact, output.as_bytes()).await {
                    Ok(file) => execution.output_file_id = Some(file.id),
                    Err(e) => {
                        error!(execution_id = %execution.id, error = %e, "Failed to save execution output")
                    }
                }
            }
        }

        if policy.save_error {
            if let Some(err_text) = execution.error.clone().filter(|e| !e.is_empty()) {
                let artifact = NewArtifact {
                    original_name: format!("{}_{}_error.txt", execution.script_name, execution.id),
                    mime_type: "text/plain".to_string(),
                    category,
                    description: Some(format!("Error of execution {}", execution.id)),
                    is_public: false,
                    uploaded_by: execution.executed_by,
                };
                match self.artifacts.save(artifact, err_text.as_bytes()).await {
                    Ok(file) => execution.error_file_id = Some(file.id),
                    Err(e) => {
                        error!(execution_id = %execution.id, error = %e, "Failed to save execution error")
                    }
                }
            }
        }
    }

    /// Recompute and persist the aggregate status of a job
    pub async fn rollup(&self, job_id: Uuid) {
        let statuses = match self.store.execution_statuses(job_id).await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load execution statuses");
                return;
            }
        };

        let status = rollup_status(&statuses);
        if let Err(e) = self.store.set_job_status(job_id, status).await {
            error!(job_id = %job_id, error = %e, "Failed to update job status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::models::{AuthMethod, HostStatus, StoredFile};
    use crate::ssh::{CommandOutput, RemoteSession, SessionFactory};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn test_host(name: &str) -> Host {
        Host {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: format!("10.0.0.{}", name.len()),
            port: 22,
            os: None,
            status: HostStatus::Unknown,
            description: None,
            tags: None,
            auth_method: AuthMethod::Password,
            username: "ops".to_string(),
            password: Some("pw".to_string()),
            private_key: None,
            passphrase: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_job_and_script(host_ids: Vec<Uuid>) -> (Job, Script) {
        let user = Uuid::new_v4();
        let script = Script {
            id: Uuid::new_v4(),
            name: "uptime".to_string(),
            content: "uptime".to_string(),
            kind: ScriptKind::Shell,
            description: None,
            created_by: user,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let job = Job {
            id: Uuid::new_v4(),
            name: "check".to_string(),
            script_id: script.id,
            host_ids,
            status: JobStatus::Pending,
            timeout_seconds: 300,
            save_output: false,
            save_error: false,
            output_category: None,
            input_file_ids: vec![],
            created_by: user,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (job, script)
    }

    /// In-memory execution store that also records every job status write
    #[derive(Default)]
    struct FakeStore {
        executions: Mutex<HashMap<Uuid, Execution>>,
        job_statuses: Mutex<Vec<JobStatus>>,
    }

    #[async_trait]
    impl ExecutionStore for FakeStore {
        async fn insert_execution(&self, execution: &Execution) -> Result<(), DatabaseError> {
            self.executions
                .lock()
                .unwrap()
                .insert(execution.id, execution.clone());
            Ok(())
        }

        async fn update_execution(&self, execution: &Execution) -> Result<(), DatabaseError> {
            self.executions
                .lock()
                .unwrap()
                .insert(execution.id, execution.clone());
            Ok(())
        }

        async fn execution_statuses(
            &self,
            job_id: Uuid,
        ) -> Result<Vec<ExecutionStatus>, DatabaseError> {
            Ok(self
                .executions
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.job_id == Some(job_id))
                .map(|e| e.status)
                .collect())
        }

        async fn set_job_status(
            &self,
            _job_id: Uuid,
            status: JobStatus,
        ) -> Result<(), DatabaseError> {
            self.job_statuses.lock().unwrap().push(status);
            Ok(())
        }
    }

    /// In-memory artifact store recording every saved payload
    #[derive(Default)]
    struct FakeArtifacts {
        saved: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ArtifactStore for FakeArtifacts {
        async fn save(
            &self,
            artifact: NewArtifact,
            data: &[u8],
        ) -> Result<StoredFile, StorageError> {
            self.saved
                .lock()
                .unwrap()
                .push((artifact.original_name.clone(), data.to_vec()));
            Ok(StoredFile {
                id: Uuid::new_v4(),
                name: artifact.original_name.clone(),
                original_name: artifact.original_name,
                path: "/tmp/fake".to_string(),
                size: data.len() as i64,
                mime_type: artifact.mime_type,
                sha256: String::new(),
                category: artifact.category,
                description: artifact.description,
                is_public: artifact.is_public,
                uploaded_by: artifact.uploaded_by,
                download_count: 0,
                created_at: Utc::now(),
            })
        }

        async fn load(&self, _file: &StoredFile) -> Result<Vec<u8>, StorageError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _file: &StoredFile) -> Result<(), StorageError> {
            Ok(())
        }
    }

    /// Factory whose sessions succeed or fail per host name, recording every
    /// open and upload made through it
    struct ScriptedFactory {
        failing_hosts: Vec<String>,
        opened: Mutex<Vec<String>>,
        uploads: Arc<Mutex<Vec<String>>>,
    }

    struct ScriptedSession {
        fail: bool,
        uploads: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RemoteSession for ScriptedSession {
        async fn run_command(&mut self, _command: &str) -> Result<CommandOutput, SshError> {
            if self.fail {
                Err(SshError::RemoteCommand {
                    exit_status: 1,
                    stdout: String::new(),
                    stderr: "no such file\n".to_string(),
                })
            } else {
                Ok(CommandOutput {
                    stdout: "up 3 days\n".to_string(),
                    stderr: String::new(),
                    exit_status: 0,
                })
            }
        }

        async fn upload_file(&mut self, _data: &[u8], remote_path: &str) -> Result<(), SshError> {
            self.uploads.lock().unwrap().push(remote_path.to_string());
            Ok(())
        }

        async fn download_file(&mut self, _remote_path: &str) -> Result<Vec<u8>, SshError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> Result<(), SshError> {
            Ok(())
        }
    }

    #[async_trait]
    impl SessionFactory for ScriptedFactory {
        async fn open(&self, host: &Host) -> Result<Box<dyn RemoteSession>, SshError> {
            self.opened.lock().unwrap().push(host.name.clone());
            Ok(Box::new(ScriptedSession {
                fail: self.failing_hosts.contains(&host.name),
                uploads: Arc::clone(&self.uploads),
            }))
        }
    }

    fn orchestrator(
        failing_hosts: Vec<String>,
    ) -> (
        ExecutionOrchestrator,
        Arc<FakeStore>,
        Arc<ScriptedFactory>,
        Arc<FakeArtifacts>,
    ) {
        let factory = Arc::new(ScriptedFactory {
            failing_hosts,
            opened: Mutex::new(Vec::new()),
            uploads: Arc::new(Mutex::new(Vec::new())),
        });
        let store = Arc::new(FakeStore::default());
        let artifacts = Arc::new(FakeArtifacts::default());
        let runner = Arc::new(ScriptRunner::new(factory.clone()));
        (
            ExecutionOrchestrator::new(runner, store.clone(), artifacts.clone()),
            store,
            factory,
            artifacts,
        )
    }

    #[test]
    fn test_rollup_any_active_means_running() {
        assert_eq!(
            rollup_status(&[ExecutionStatus::Completed, ExecutionStatus::Pending]),
            JobStatus::Running
        );
        assert_eq!(
            rollup_status(&[ExecutionStatus::Failed, ExecutionStatus::Running]),
            JobStatus::Running
        );
    }

    #[test]
    fn test_rollup_terminal_combinations() {
        assert_eq!(
            rollup_status(&[ExecutionStatus::Completed, ExecutionStatus::Completed]),
            JobStatus::Completed
        );
        assert_eq!(
            rollup_status(&[ExecutionStatus::Failed, ExecutionStatus::Failed]),
            JobStatus::Failed
        );
        assert_eq!(
            rollup_status(&[ExecutionStatus::Completed, ExecutionStatus::Failed]),
            JobStatus::PartialFailed
        );
    }

    #[test]
    fn test_rollup_no_executions_is_completed() {
        assert_eq!(rollup_status(&[]), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_launch_opens_one_session_per_host() {
        let (orch, _store, factory, _) = orchestrator(vec![]);
        let hosts = vec![test_host("a"), test_host("bb"), test_host("ccc")];
        let (job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(run.execution_ids.len(), 3);
        run.handle.await.unwrap();

        let mut opened = factory.opened.lock().unwrap().clone();
        opened.sort();
        assert_eq!(opened, vec!["a", "bb", "ccc"]);
    }

    #[tokio::test]
    async fn test_all_success_rolls_up_completed() {
        let (orch, store, _, _) = orchestrator(vec![]);
        let hosts = vec![test_host("a"), test_host("b")];
        let (job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        let statuses = store.job_statuses.lock().unwrap();
        assert_eq!(statuses.first(), Some(&JobStatus::Running));
        assert_eq!(statuses.last(), Some(&JobStatus::Completed));

        let executions = store.executions.lock().unwrap();
        for execution in executions.values() {
            assert_eq!(execution.status, ExecutionStatus::Completed);
            assert_eq!(execution.output.as_deref(), Some("up 3 days\n"));
            assert!(execution.started_at.is_some());
            assert!(execution.completed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_mixed_outcome_rolls_up_partial_failed() {
        let (orch, store, _, _) = orchestrator(vec!["bad".to_string()]);
        let hosts = vec![test_host("good"), test_host("bad")];
        let (job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        assert_eq!(
            store.job_statuses.lock().unwrap().last(),
            Some(&JobStatus::PartialFailed)
        );
    }

    #[tokio::test]
    async fn test_total_failure_rolls_up_failed() {
        let (orch, store, _, _) = orchestrator(vec!["a".to_string(), "b".to_string()]);
        let hosts = vec![test_host("a"), test_host("b")];
        let (job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        assert_eq!(
            store.job_statuses.lock().unwrap().last(),
            Some(&JobStatus::Failed)
        );

        let executions = store.executions.lock().unwrap();
        for execution in executions.values() {
            assert_eq!(execution.status, ExecutionStatus::Failed);
            // Failure output is preserved alongside the error
            assert_eq!(execution.output.as_deref(), Some("no such file\n"));
            assert!(execution.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_quick_execution_records_snapshot_without_job() {
        let (orch, store, _, _) = orchestrator(vec![]);
        let hosts = vec![test_host("a")];

        let run = orch
            .launch_quick(
                "adhoc",
                ScriptKind::Shell,
                "uptime",
                hosts,
                Arc::new(Vec::new()),
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        run.handle.await.unwrap();

        // No parent job, so no job status writes at all
        assert!(store.job_statuses.lock().unwrap().is_empty());

        let executions = store.executions.lock().unwrap();
        let execution = executions.values().next().unwrap();
        assert!(execution.quick_exec);
        assert_eq!(execution.job_id, None);
        assert_eq!(execution.script_content, "uptime");
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_quick_execution_uploads_input_files() {
        let (orch, _store, factory, _) = orchestrator(vec![]);
        let hosts = vec![test_host("a")];

        let files = Arc::new(vec![("data.csv".to_string(), b"a,b\n".to_vec())]);
        let run = orch
            .launch_quick(
                "adhoc",
                ScriptKind::Shell,
                "wc -l /tmp/data.csv",
                hosts,
                files,
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        run.handle.await.unwrap();

        let uploads = factory.uploads.lock().unwrap();
        assert_eq!(*uploads, vec!["/tmp/data.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_credential_gap_fails_without_connecting() {
        let (orch, store, factory, _) = orchestrator(vec![]);
        let mut host = test_host("bare");
        host.password = None;
        let (job, script) = test_job_and_script(vec![host.id]);

        let run = orch
            .launch(&job, &script, vec![host], Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        // No session was ever opened for the misconfigured host
        assert!(factory.opened.lock().unwrap().is_empty());

        let executions = store.executions.lock().unwrap();
        let execution = executions.values().next().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(
            execution.error.as_deref(),
            Some("Host has no SSH password configured")
        );
        assert!(execution.started_at.is_none());
        assert!(execution.completed_at.is_some());
        assert_eq!(
            store.job_statuses.lock().unwrap().last(),
            Some(&JobStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_save_output_persists_artifact_when_requested() {
        let (orch, store, _, artifacts) = orchestrator(vec![]);
        let hosts = vec![test_host("a")];
        let (mut job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());
        job.save_output = true;
        job.output_category = Some("nightly-reports".to_string());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        let saved = artifacts.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].0.ends_with("_output.txt"));
        assert_eq!(saved[0].1, b"up 3 days\n");

        let executions = store.executions.lock().unwrap();
        let execution = executions.values().next().unwrap();
        assert!(execution.output_file_id.is_some());
        assert!(execution.error_file_id.is_none());
    }

    #[tokio::test]
    async fn test_save_error_persists_artifact_on_failure() {
        let (orch, store, _, artifacts) = orchestrator(vec!["a".to_string()]);
        let hosts = vec![test_host("a")];
        let (mut job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());
        job.save_error = true;

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        let saved = artifacts.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].0.ends_with("_error.txt"));

        let executions = store.executions.lock().unwrap();
        let execution = executions.values().next().unwrap();
        assert!(execution.error_file_id.is_some());
    }

    #[tokio::test]
    async fn test_nothing_saved_unless_job_asks() {
        let (orch, store, _, artifacts) = orchestrator(vec![]);
        let hosts = vec![test_host("a")];
        let (job, script) = test_job_and_script(hosts.iter().map(|h| h.id).collect());

        let run = orch
            .launch(&job, &script, hosts, Arc::new(Vec::new()), Uuid::new_v4())
            .await
            .unwrap();
        run.handle.await.unwrap();

        assert!(artifacts.saved.lock().unwrap().is_empty());
        let executions = store.executions.lock().unwrap();
        let execution = executions.values().next().unwrap();
        assert!(execution.output_file_id.is_none());
    }
}
