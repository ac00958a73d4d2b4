//! Online/offline signal
//!
//! [`Connectivity`] is a `watch` cell shared by the sync worker, the
//! enrichment channel and whoever knows about the network. In the binary
//! that is [`ConnectivityProbe`], which pings the backend periodically; tests
//! flip the cell directly.

use crate::remote::RemoteOrderRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared online/offline state
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state; subscribers are only woken on an actual change
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("Backend reachable, switching to online");
            } else {
                tracing::warn!("Backend unreachable, switching to offline");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    /// Offline until proven otherwise
    fn default() -> Self {
        Self::new(false)
    }
}

/// Periodic health check that drives [`Connectivity`]
pub struct ConnectivityProbe {
    repository: Arc<dyn RemoteOrderRepository>,
    connectivity: Connectivity,
    interval: Duration,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(
        repository: Arc<dyn RemoteOrderRepository>,
        connectivity: Connectivity,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            connectivity,
            interval,
            timeout,
        }
    }

    /// Ping once and publish the result
    pub async fn probe(&self) -> bool {
        let online = match tokio::time::timeout(self.timeout, self.repository.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Health check timed out");
                false
            }
        };
        self.connectivity.set_online(online);
        online
    }

    /// Probe until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "ConnectivityProbe started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.probe().await;
                }
            }
        }

        tracing::info!("ConnectivityProbe stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let connectivity = Connectivity::default();
        let mut rx = connectivity.subscribe();
        assert!(!connectivity.is_online());

        connectivity.set_online(false);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(true);
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Connectivity::new(true);
        let b = a.clone();
        b.set_online(false);
        assert!(!a.is_online());
    }
}
