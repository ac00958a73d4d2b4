//! SyncWorker - drains the mutation queue to the backend
//!
//! Wakes on any of:
//! 1. the periodic interval (default 30s)
//! 2. connectivity flipping from offline to online
//! 3. a [`SyncTrigger`] poke after a local commit
//!
//! A drain claims due mutations FIFO and runs up to `concurrency` remote
//! calls at once. Each order is attempted at most once per drain, so a
//! failing order cannot spin; it waits for its backoff and the next wake-up.

use super::SyncTrigger;
use crate::core::Connectivity;
use crate::orders::{FailureOutcome, MutationQueue, StorageError, SyncOutcome};
use crate::remote::{RemoteError, RemoteOrderRepository, RemoteResult};
use shared::order::{Mutation, MutationOp};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SYNC_CONCURRENCY: usize = 8;
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sync worker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Maximum concurrent remote writes
    pub concurrency: usize,
    /// Deadline for each remote call
    pub remote_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            concurrency: DEFAULT_SYNC_CONCURRENCY,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

/// Counts from one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    /// Synced, but a newer edit is still queued
    pub superseded: usize,
    /// Failed and scheduled for another attempt
    pub retried: usize,
    /// Moved to the dead letter queue
    pub failed: usize,
    /// Order deleted locally while its write was in flight
    pub discarded: usize,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.synced + self.superseded + self.retried + self.failed + self.discarded
    }

    fn record(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Synced => self.synced += 1,
            ProcessOutcome::Superseded => self.superseded += 1,
            ProcessOutcome::Retried => self.retried += 1,
            ProcessOutcome::Failed => self.failed += 1,
            ProcessOutcome::Discarded => self.discarded += 1,
            ProcessOutcome::StoreError => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessOutcome {
    Synced,
    Superseded,
    Retried,
    Failed,
    Discarded,
    /// Local store failed while recording a failure; the claim is released on restart
    StoreError,
}

/// Background worker pushing queued mutations to the backend
#[derive(Clone)]
pub struct SyncWorker {
    queue: MutationQueue,
    repository: Arc<dyn RemoteOrderRepository>,
    connectivity: Connectivity,
    trigger: SyncTrigger,
    config: SyncConfig,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("repository", &"<dyn RemoteOrderRepository>")
            .field("config", &self.config)
            .finish()
    }
}

impl SyncWorker {
    pub fn new(
        queue: MutationQueue,
        repository: Arc<dyn RemoteOrderRepository>,
        connectivity: Connectivity,
        trigger: SyncTrigger,
        config: SyncConfig,
    ) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            queue,
            repository,
            connectivity,
            trigger,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Cancelling mid-drain drops the running calls; their claims are
    /// released by `recover_in_flight` on the next start.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            concurrency = self.config.concurrency,
            "SyncWorker started"
        );

        match self.queue.recover_in_flight() {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Released in-flight mutations from previous run"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight mutations"),
        }

        let mut online_rx = self.connectivity.subscribe();
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {}
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        tracing::info!("Connectivity channel closed, SyncWorker stopping");
                        break;
                    }
                    if !*online_rx.borrow_and_update() {
                        continue;
                    }
                    tracing::info!("Back online, draining mutation queue");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.drain() => {}
            }
        }

        tracing::info!("SyncWorker stopped");
    }

    /// Push every due mutation once
    ///
    /// No-op while offline.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping drain");
            return report;
        }

        let mut attempted: HashSet<String> = HashSet::new();
        let mut running: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut exhausted = false;

        loop {
            while !exhausted && self.connectivity.is_online() {
                let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                    break;
                };
                match self.queue.dequeue_next_excluding(&attempted) {
                    Ok(Some(mutation)) => {
                        attempted.insert(mutation.order_id.clone());
                        let order_id = mutation.order_id.clone();
                        let worker = self.clone();
                        let handle = tasks.spawn(async move {
                            let _permit = permit;
                            worker.process(mutation).await
                        });
                        running.insert(handle.id(), order_id);
                    }
                    Ok(None) => exhausted = true,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to dequeue mutation");
                        exhausted = true;
                    }
                }
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            match joined {
                Ok((id, outcome)) => {
                    running.remove(&id);
                    report.record(outcome);
                }
                Err(e) => {
                    let order_id = running.remove(&e.id()).unwrap_or_default();
                    tracing::error!(order_id = %order_id, error = %e, "Sync task panicked");
                    if !order_id.is_empty() {
                        report.record(self.record_failure(&order_id, &e.to_string()));
                    }
                }
            }
        }

        if report.attempted() > 0 {
            tracing::info!(
                synced = report.synced,
                superseded = report.superseded,
                retried = report.retried,
                failed = report.failed,
                discarded = report.discarded,
                "Drain finished"
            );
        }
        report
    }

    /// Send one claimed mutation and record the result
    async fn process(&self, mutation: Mutation) -> ProcessOutcome {
        let order_id = mutation.order_id.as_str();

        let result = match (mutation.operation, mutation.payload.remote_id.as_deref()) {
            (MutationOp::Update, Some(remote_id)) => self
                .call(self.repository.update_order(remote_id, &mutation.payload))
                .await
                .map(|()| remote_id.to_string()),
            _ => match self.call(self.repository.create_order(&mutation.payload)).await {
                Ok(remote_id) if remote_id.trim().is_empty() => Err(RemoteError::InvalidResponse(
                    "create response carried an empty id".to_string(),
                )),
                other => other,
            },
        };

        match result {
            Ok(remote_id) => {
                match self.queue.mark_synced(order_id, &remote_id, mutation.revision) {
                    Ok(SyncOutcome::Synced | SyncOutcome::AlreadyApplied) => {
                        tracing::debug!(order_id = %order_id, remote_id = %remote_id, operation = %mutation.operation, "Order synced");
                        ProcessOutcome::Synced
                    }
                    Ok(SyncOutcome::Superseded) => ProcessOutcome::Superseded,
                    Ok(SyncOutcome::Discarded) => ProcessOutcome::Discarded,
                    Err(e) => self.release_unconfirmed(order_id, &e),
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    order_id = %order_id,
                    attempt = mutation.attempt_count + 1,
                    error = %e,
                    "Sync attempt failed"
                );
                self.record_failure(order_id, &e.to_string())
            }
            Err(e) => match self.queue.mark_rejected(order_id, &e.to_string()) {
                Ok(FailureOutcome::Discarded) => ProcessOutcome::Discarded,
                Ok(_) => ProcessOutcome::Failed,
                Err(store_err) => {
                    tracing::error!(order_id = %order_id, error = %store_err, "Failed to dead-letter mutation");
                    ProcessOutcome::StoreError
                }
            },
        }
    }

    /// The remote write landed but the local confirmation did not: release
    /// the claim so the next drain resends it
    fn release_unconfirmed(&self, order_id: &str, error: &StorageError) -> ProcessOutcome {
        tracing::error!(order_id = %order_id, error = %error, "Failed to mark mutation synced, releasing claim");
        self.record_failure(order_id, &format!("local store error after remote write: {error}"))
    }

    fn record_failure(&self, order_id: &str, error: &str) -> ProcessOutcome {
        match self.queue.mark_failed(order_id, error) {
            Ok(FailureOutcome::WillRetry { .. }) => ProcessOutcome::Retried,
            Ok(FailureOutcome::DeadLettered) => ProcessOutcome::Failed,
            Ok(FailureOutcome::Discarded) => ProcessOutcome::Discarded,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to mark mutation failed");
                ProcessOutcome::StoreError
            }
        }
    }

    /// Bound a remote call by the configured timeout
    async fn call<T>(&self, request: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        let deadline = self.config.remote_timeout;
        tokio::time::timeout(deadline, request)
            .await
            .unwrap_or(Err(RemoteError::Timeout(deadline)))
    }
}
