// Distribution orchestrator: fans one file out to N hosts with bounded
// concurrency and per-host retries

use crate::config::DistributionConfig;
use crate::errors::{DatabaseError, SshError};
use crate::models::{
    DistributionStatus, ExecutionStatus, FileDistribution, FileDistributionDetail, Host,
};
use crate::orchestrator::DistributionStore;
use crate::ssh::SessionFactory;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, instrument, warn};

/// Final aggregate from per-host outcomes: every host failing is a failure,
/// every host succeeding is completed, anything in between is partial
pub fn aggregate_status(succeeded: usize, total: usize) -> DistributionStatus {
    if succeeded == 0 {
        DistributionStatus::Failed
    } else if succeeded < total {
        DistributionStatus::Partial
    } else {
        DistributionStatus::Completed
    }
}

/// Overall progress percentage, counting finished hosts whether they
/// succeeded or failed
pub fn progress_percent(finished: usize, total: usize) -> i32 {
    if total == 0 {
        100
    } else {
        (finished * 100 / total) as i32
    }
}

/// Pushes one file to many hosts. Admission is capped by a semaphore, each
/// host gets up to `max_attempts` tries with linearly growing backoff, and
/// progress is reported as hosts finish.
#[derive(Clone)]
pub struct DistributionOrchestrator {
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn DistributionStore>,
    config: DistributionConfig,
}

impl DistributionOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn DistributionStore>,
        config: DistributionConfig,
    ) -> Self {
        Self {
            sessions,
            store,
            config,
        }
    }

    /// Start a distribution. Per-host detail rows are inserted as pending
    /// before the fan-out begins, so the detail listing is complete from the
    /// first moment the distribution is visible.
    #[instrument(skip(self, distribution, data, hosts), fields(distribution_id = %distribution.id, hosts = hosts.len()))]
    pub async fn begin(
        &self,
        distribution: FileDistribution,
        data: Arc<Vec<u8>>,
        hosts: Vec<Host>,
    ) -> Result<JoinHandle<()>, DatabaseError> {
        let mut details = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let detail = FileDistributionDetail::new(distribution.id, host.id);
            self.store.insert_detail(&detail).await?;
            details.push(detail);
        }

        info!(distribution_id = %distribution.id, hosts = hosts.len(), "Distribution started");

        let orchestrator = self.clone();
        Ok(tokio::spawn(async move {
            orchestrator.run(distribution, data, hosts, details).await;
        }))
    }

    async fn run(
        &self,
        distribution: FileDistribution,
        data: Arc<Vec<u8>>,
        hosts: Vec<Host>,
        details: Vec<FileDistributionDetail>,
    ) {
        if let Err(e) = self
            .store
            .set_distribution_status(
                distribution.id,
                DistributionStatus::Running,
                Some(Utc::now()),
                None,
            )
            .await
        {
            error!(distribution_id = %distribution.id, error = %e, "Failed to mark distribution running");
        }

        let total = hosts.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for (host, detail) in hosts.into_iter().zip(details) {
            let orch = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let finished = Arc::clone(&finished);
            let data = Arc::clone(&data);
            let distribution_id = distribution.id;
            let target_path = distribution.target_path.clone();

            tasks.spawn(async move {
                // Closed semaphore is unreachable: it lives as long as the task set
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };

                let success = orch.transfer_to_host(detail, &host, &data, &target_path).await;
                crate::telemetry::record_transfer_outcome(success);

                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = progress_percent(done, total);
                if let Err(e) = orch.store.set_progress(distribution_id, progress).await {
                    error!(distribution_id = %distribution_id, error = %e, "Failed to update progress");
                }
                info!(
                    distribution_id = %distribution_id,
                    finished = done,
                    total = total,
                    progress = progress,
                    "Distribution progress"
                );

                success
            });
        }

        let mut succeeded = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => error!(distribution_id = %distribution.id, error = %e, "Transfer task panicked"),
            }
        }

        let status = aggregate_status(succeeded, total);
        if let Err(e) = self.store.set_progress(distribution.id, 100).await {
            error!(distribution_id = %distribution.id, error = %e, "Failed to finalize progress");
        }
        if let Err(e) = self
            .store
            .set_distribution_status(distribution.id, status, None, Some(Utc::now()))
            .await
        {
            error!(distribution_id = %distribution.id, error = %e, "Failed to finalize distribution");
        }

        info!(
            distribution_id = %distribution.id,
            succeeded = succeeded,
            total = total,
            status = %status,
            "Distribution finished"
        );
    }

    /// Transfer the file to one host with retries. Returns whether the
    /// transfer ultimately succeeded.
    async fn transfer_to_host(
        &self,
        mut detail: FileDistributionDetail,
        host: &Host,
        data: &[u8],
        target_path: &str,
    ) -> bool {
        detail.status = ExecutionStatus::Running;
        detail.started_at = Some(Utc::now());
        if let Err(e) = self.store.update_detail(&detail).await {
            error!(detail_id = %detail.id, error = %e, "Failed to mark detail running");
        }

        let max_attempts = self.config.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            info!(host = %host.name, attempt = attempt, max_attempts = max_attempts, "Transferring file");

            match self.try_transfer(host, data, target_path).await {
                Ok(()) => {
                    detail.status = ExecutionStatus::Completed;
                    detail.output = Some(format!("File transfer succeeded (attempt {})", attempt));
                    detail.completed_at = Some(Utc::now());
                    if let Err(e) = self.store.update_detail(&detail).await {
                        error!(detail_id = %detail.id, error = %e, "Failed to record transfer success");
                    }
                    info!(host = %host.name, attempt = attempt, "File transfer succeeded");
                    return true;
                }
                Err(e) => {
                    warn!(host = %host.name, attempt = attempt, error = %e, "File transfer failed");

                    // Deterministic failures surface immediately: retrying a
                    // credential gap or a bad key cannot change the outcome
                    if !e.is_retryable() {
                        detail.status = ExecutionStatus::Failed;
                        detail.error = Some(e.to_string());
                        detail.completed_at = Some(Utc::now());
                        if let Err(e) = self.store.update_detail(&detail).await {
                            error!(detail_id = %detail.id, error = %e, "Failed to record transfer failure");
                        }
                        return false;
                    }

                    last_error = Some(e);
                    if attempt < max_attempts {
                        let delay = Duration::from_secs(
                            u64::from(attempt) * self.config.retry_backoff_seconds,
                        );
                        info!(host = %host.name, delay_seconds = delay.as_secs(), "Waiting before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        detail.status = ExecutionStatus::Failed;
        detail.error = Some(match last_error {
            Some(e) => format!("Failed after {} attempts: {}", max_attempts, e),
            None => format!("Failed after {} attempts", max_attempts),
        });
        detail.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_detail(&detail).await {
            error!(detail_id = %detail.id, error = %e, "Failed to record transfer failure");
        }

        error!(host = %host.name, attempts = max_attempts, "File transfer gave up");
        false
    }

    async fn try_transfer(
        &self,
        host: &Host,
        data: &[u8],
        target_path: &str,
    ) -> Result<(), SshError> {
        let mut session = self.sessions.open(host).await?;
        let result = session.upload_file(data, target_path).await;
        if let Err(e) = session.close().await {
            tracing::debug!(host = %host.name, error = %e, "Session close failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMethod, HostStatus};
    use crate::ssh::{CommandOutput, RemoteSession};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use uuid::Uuid;

    fn test_host(name: &str) -> Host {
        Host {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: "10.0.0.9".to_string(),
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

    fn test_distribution(host_ids: Vec<Uuid>) -> FileDistribution {
        FileDistribution::new(
            Uuid::new_v4(),
            host_ids,
            "/opt/app/config.yml".to_string(),
            Uuid::new_v4(),
        )
    }

    #[derive(Default)]
    struct FakeStore {
        details: Mutex<HashMap<Uuid, FileDistributionDetail>>,
        statuses: Mutex<Vec<DistributionStatus>>,
        progress: Mutex<Vec<i32>>,
    }

    #[async_trait]
    impl DistributionStore for FakeStore {
        async fn set_distribution_status(
            &self,
            _id: Uuid,
            status: DistributionStatus,
            _started_at: Option<chrono::DateTime<Utc>>,
            _completed_at: Option<chrono::DateTime<Utc>>,
        ) -> Result<(), DatabaseError> {
            self.statuses.lock().unwrap().push(status);
            Ok(())
        }

        async fn set_progress(&self, _id: Uuid, progress: i32) -> Result<(), DatabaseError> {
            self.progress.lock().unwrap().push(progress);
            Ok(())
        }

        async fn insert_detail(
            &self,
            detail: &FileDistributionDetail,
        ) -> Result<(), DatabaseError> {
            self.details
                .lock()
                .unwrap()
                .insert(detail.id, detail.clone());
            Ok(())
        }

        async fn update_detail(
            &self,
            detail: &FileDistributionDetail,
        ) -> Result<(), DatabaseError> {
            self.details
                .lock()
                .unwrap()
                .insert(detail.id, detail.clone());
            Ok(())
        }
    }

    /// Per-host script of upload outcomes; also tracks the concurrency
    /// high-water mark across open sessions
    struct TransferPlan {
        // host name -> number of failures before success; None = always fail
        failures_before_success: HashMap<String, Option<u32>>,
        non_retryable_hosts: Vec<String>,
        attempts: Mutex<HashMap<String, u32>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl TransferPlan {
        fn always_succeed() -> Self {
            Self {
                failures_before_success: HashMap::new(),
                non_retryable_hosts: Vec::new(),
                attempts: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }
    }

    struct PlannedSession {
        plan: Arc<TransferPlan>,
        host: String,
    }

    #[async_trait]
    impl RemoteSession for PlannedSession {
        async fn run_command(&mut self, _command: &str) -> Result<CommandOutput, SshError> {
            Ok(CommandOutput::default())
        }

        async fn upload_file(&mut self, _data: &[u8], _remote_path: &str) -> Result<(), SshError> {
            // Hold the slot briefly so overlapping transfers are observable
            let current = self.plan.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.plan.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.plan.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut attempts = self.plan.attempts.lock().unwrap();
            let count = attempts.entry(self.host.clone()).or_insert(0);
            *count += 1;

            match self.plan.failures_before_success.get(&self.host) {
                None => Ok(()),
                Some(None) => Err(SshError::Transfer("connection reset".to_string())),
                Some(Some(failures)) if *count > *failures => Ok(()),
                Some(Some(_)) => Err(SshError::Transfer("connection reset".to_string())),
            }
        }

        async fn download_file(&mut self, _remote_path: &str) -> Result<Vec<u8>, SshError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> Result<(), SshError> {
            Ok(())
        }
    }

    struct PlannedFactory {
        plan: Arc<TransferPlan>,
    }

    #[async_trait]
    impl SessionFactory for PlannedFactory {
        async fn open(&self, host: &Host) -> Result<Box<dyn RemoteSession>, SshError> {
            if self.plan.non_retryable_hosts.contains(&host.name) {
                return Err(SshError::Configuration(
                    "Host has no SSH password configured".to_string(),
                ));
            }
            Ok(Box::new(PlannedSession {
                plan: Arc::clone(&self.plan),
                host: host.name.clone(),
            }))
        }
    }

    fn orchestrator(
        plan: TransferPlan,
    ) -> (DistributionOrchestrator, Arc<FakeStore>, Arc<TransferPlan>) {
        let plan = Arc::new(plan);
        let store = Arc::new(FakeStore::default());
        let factory = Arc::new(PlannedFactory {
            plan: Arc::clone(&plan),
        });
        (
            DistributionOrchestrator::new(factory, store.clone(), DistributionConfig::default()),
            store,
            plan,
        )
    }

    #[test]
    fn test_aggregate_status_boundaries() {
        assert_eq!(aggregate_status(0, 3), DistributionStatus::Failed);
        assert_eq!(aggregate_status(1, 3), DistributionStatus::Partial);
        assert_eq!(aggregate_status(3, 3), DistributionStatus::Completed);
    }

    #[test]
    fn test_progress_floors_the_percentage() {
        assert_eq!(progress_percent(0, 3), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrency_never_exceeds_cap() {
        let (orch, _store, plan) = orchestrator(TransferPlan::always_succeed());
        let hosts: Vec<Host> = (0..10).map(|i| test_host(&format!("h{}", i))).collect();
        let distribution = test_distribution(hosts.iter().map(|h| h.id).collect());

        let handle = orch
            .begin(distribution, Arc::new(vec![1, 2, 3]), hosts)
            .await
            .unwrap();
        handle.await.unwrap();

        assert!(plan.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_is_linear() {
        let mut failures = HashMap::new();
        // Two transient failures, success on the third attempt
        failures.insert("flaky".to_string(), Some(2));
        let (orch, store, plan) = orchestrator(TransferPlan {
            failures_before_success: failures,
            ..TransferPlan::always_succeed()
        });

        let hosts = vec![test_host("flaky")];
        let distribution = test_distribution(vec![hosts[0].id]);

        let started = Instant::now();
        let handle = orch
            .begin(distribution, Arc::new(vec![0]), hosts)
            .await
            .unwrap();
        handle.await.unwrap();

        // 1s after the first failure, 2s after the second
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(plan.attempts.lock().unwrap()["flaky"], 3);

        let details = store.details.lock().unwrap();
        let detail = details.values().next().unwrap();
        assert_eq!(detail.status, ExecutionStatus::Completed);
        assert_eq!(
            detail.output.as_deref(),
            Some("File transfer succeeded (attempt 3)")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_attempt_count() {
        let mut failures = HashMap::new();
        failures.insert("dead".to_string(), None);
        let (orch, store, plan) = orchestrator(TransferPlan {
            failures_before_success: failures,
            ..TransferPlan::always_succeed()
        });

        let hosts = vec![test_host("dead")];
        let distribution = test_distribution(vec![hosts[0].id]);

        let handle = orch
            .begin(distribution, Arc::new(vec![0]), hosts)
            .await
            .unwrap();
        handle.await.unwrap();

        assert_eq!(plan.attempts.lock().unwrap()["dead"], 3);

        let details = store.details.lock().unwrap();
        let detail = details.values().next().unwrap();
        assert_eq!(detail.status, ExecutionStatus::Failed);
        let error = detail.error.as_deref().unwrap();
        assert!(error.starts_with("Failed after 3 attempts"));

        assert_eq!(
            store.statuses.lock().unwrap().last(),
            Some(&DistributionStatus::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_without_retry() {
        let (orch, store, _) = orchestrator(TransferPlan {
            non_retryable_hosts: vec!["locked".to_string()],
            ..TransferPlan::always_succeed()
        });

        let hosts = vec![test_host("locked")];
        let distribution = test_distribution(vec![hosts[0].id]);

        let started = Instant::now();
        let handle = orch
            .begin(distribution, Arc::new(vec![0]), hosts)
            .await
            .unwrap();
        handle.await.unwrap();

        // No backoff sleeps happened
        assert!(started.elapsed() < Duration::from_secs(1));

        let details = store.details.lock().unwrap();
        let detail = details.values().next().unwrap();
        assert_eq!(detail.status, ExecutionStatus::Failed);
        assert!(detail
            .error
            .as_deref()
            .unwrap()
            .contains("no SSH password configured"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mixed_outcome_is_partial_with_full_progress() {
        let mut failures = HashMap::new();
        failures.insert("dead".to_string(), None);
        let (orch, store, _) = orchestrator(TransferPlan {
            failures_before_success: failures,
            ..TransferPlan::always_succeed()
        });

        let hosts = vec![test_host("ok"), test_host("dead")];
        let distribution = test_distribution(hosts.iter().map(|h| h.id).collect());

        let handle = orch
            .begin(distribution, Arc::new(vec![0]), hosts)
            .await
            .unwrap();
        handle.await.unwrap();

        let statuses = store.statuses.lock().unwrap();
        assert_eq!(statuses.first(), Some(&DistributionStatus::Running));
        assert_eq!(statuses.last(), Some(&DistributionStatus::Partial));

        // Progress reaches 100 even though one host failed
        assert_eq!(store.progress.lock().unwrap().last(), Some(&100));
    }
}
