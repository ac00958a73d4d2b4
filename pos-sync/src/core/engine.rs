//! Engine - wires the order model, sync worker and connectivity together

use super::config::Config;
use super::connectivity::{Connectivity, ConnectivityProbe};
use super::tasks::{BackgroundTasks, TaskKind};
use crate::enrichment::{CustomerDirectory, CustomerEnricher};
use crate::orders::{OrderError, OrdersManager};
use crate::remote::RemoteOrderRepository;
use crate::sync::SyncWorker;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to prepare work dir {path}: {source}")]
    WorkDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Order(#[from] OrderError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A running (or ready to run) sync engine
pub struct Engine {
    config: Config,
    manager: OrdersManager,
    connectivity: Connectivity,
    repository: Arc<dyn RemoteOrderRepository>,
    tasks: BackgroundTasks,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("work_dir", &self.config.work_dir)
            .field("manager", &self.manager)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Engine {
    /// Open the local store under `config.work_dir` and build the components
    ///
    /// Connectivity starts offline; orders can be taken immediately.
    pub fn open(
        config: Config,
        repository: Arc<dyn RemoteOrderRepository>,
        directory: Option<Arc<dyn CustomerDirectory>>,
    ) -> EngineResult<Self> {
        std::fs::create_dir_all(&config.work_dir).map_err(|source| EngineError::WorkDir {
            path: config.work_dir.clone(),
            source,
        })?;

        let gst = config.gst()?;
        let mut manager = OrdersManager::open(config.db_path(), gst, config.retry_policy())?;
        let connectivity = Connectivity::default();
        if let Some(directory) = directory {
            manager.set_enricher(CustomerEnricher::new(
                directory,
                connectivity.clone(),
                config.remote_timeout(),
            ));
        }

        tracing::info!(
            work_dir = %config.work_dir,
            gst_mode = %gst.mode(),
            gst_percentage = %gst.percentage(),
            "Sync engine opened"
        );

        Ok(Self {
            config,
            manager,
            connectivity,
            repository,
            tasks: BackgroundTasks::new(),
        })
    }

    /// Order model handle for the UI layer
    pub fn manager(&self) -> &OrdersManager {
        &self.manager
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a sync worker over this engine's queue
    pub fn sync_worker(&self) -> SyncWorker {
        SyncWorker::new(
            self.manager.queue().clone(),
            self.repository.clone(),
            self.connectivity.clone(),
            self.manager.trigger(),
            self.config.sync_config(),
        )
    }

    /// Start the sync worker and the connectivity probe
    pub fn start(&mut self) {
        self.start_sync_worker();
        let probe = ConnectivityProbe::new(
            self.repository.clone(),
            self.connectivity.clone(),
            self.config.probe_interval(),
            self.config.remote_timeout(),
        );
        let token = self.tasks.shutdown_token();
        self.tasks
            .spawn("connectivity_probe", TaskKind::Periodic, probe.run(token));
    }

    /// Start only the sync worker; connectivity is driven by the caller
    pub fn start_sync_worker(&mut self) {
        let worker = self.sync_worker();
        let token = self.tasks.shutdown_token();
        self.tasks.spawn("sync_worker", TaskKind::Worker, worker.run(token));
    }

    /// Number of background tasks that died unexpectedly
    pub fn check_health(&self) -> usize {
        self.tasks.check_health()
    }

    /// Stop background tasks; the local store stays consistent
    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
    }
}
