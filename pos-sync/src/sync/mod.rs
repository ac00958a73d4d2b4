//! Background synchronization of queued mutations to the backend
//!
//! - **worker**: [`SyncWorker`] drains the mutation queue
//! - [`SyncTrigger`]: poked by the order model after every local commit

pub mod worker;

pub use worker::{DrainReport, SyncConfig, SyncWorker};

use std::sync::Arc;
use tokio::sync::Notify;

/// Wake-up signal for the sync worker
///
/// Pokes coalesce: many commits while a drain is running produce at most one
/// follow-up drain.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
}

impl SyncTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a drain; never blocks
    pub fn poke(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next poke
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
