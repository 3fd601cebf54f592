// Periodic host reachability poller

use crate::db::repositories::HostRepository;
use crate::errors::DatabaseError;
use crate::models::{Host, HostStatus};
use crate::ssh::{probe_host, SessionFactory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Persistence seam for the poller
#[async_trait]
pub trait PollerStore: Send + Sync {
    async fn list_hosts(&self) -> Result<Vec<Host>, DatabaseError>;
    async fn set_host_status(&self, id: Uuid, status: HostStatus) -> Result<(), DatabaseError>;
}

/// sqlx-backed poller store
pub struct DbPollerStore {
    hosts: HostRepository,
}

impl DbPollerStore {
    pub fn new(hosts: HostRepository) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl PollerStore for DbPollerStore {
    async fn list_hosts(&self) -> Result<Vec<Host>, DatabaseError> {
        self.hosts.find_all().await
    }

    async fn set_host_status(&self, id: Uuid, status: HostStatus) -> Result<(), DatabaseError> {
        self.hosts.update_status(id, status).await
    }
}

/// Sweeps the fleet on a fixed interval and records reachability changes.
///
/// Status writes are advisory and last-write-wins. A host with no stored
/// credentials is never probed and keeps its `unknown` status. Only changed
/// statuses are written back, so a stable fleet costs nothing per sweep.
pub struct HostStatusPoller {
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn PollerStore>,
    interval: Duration,
}

impl HostStatusPoller {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn PollerStore>,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            store,
            interval,
        }
    }

    /// Run until the shutdown signal flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_seconds = self.interval.as_secs(), "Host status poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Host status poller shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Probe every pollable host once and persist any status changes
    pub async fn sweep(&self) {
        let hosts = match self.store.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(error = %e, "Failed to list hosts for polling");
                return;
            }
        };

        let mut online = 0;
        for host in &hosts {
            if !host.has_any_credentials() {
                debug!(host = %host.name, "Skipping host without credentials");
                continue;
            }

            let report = probe_host(self.sessions.as_ref(), host).await;
            let observed = if report.success {
                online += 1;
                HostStatus::Online
            } else {
                HostStatus::Offline
            };

            if observed != host.status {
                info!(
                    host = %host.name,
                    previous = %host.status,
                    observed = %observed,
                    "Host status changed"
                );
                if let Err(e) = self.store.set_host_status(host.id, observed).await {
                    error!(host = %host.name, error = %e, "Failed to update host status");
                }
            }
        }

        crate::telemetry::set_hosts_online(online);
        debug!(hosts = hosts.len(), online = online, "Host sweep finished");
    }
}
