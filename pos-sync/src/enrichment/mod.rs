//! Customer enrichment channel
//!
//! After an order with a customer phone is committed locally, the customer
//! directory is told about the visit: an existing customer gets
//! `total_visits + 1`, a new phone number is inserted. This is best effort.
//! It runs as a detached task with its own timeout, has no result channel,
//! and is never queued or retried. Order creation never waits on it.

use crate::core::Connectivity;
use crate::remote::RemoteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::order::{Customer, Order};
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;

/// Customer as stored in the remote directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub total_visits: u32,
    /// Unix millis
    #[serde(default)]
    pub last_visit: Option<i64>,
}

/// A visit to record against an existing customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerVisit {
    /// Latest name given at the till, if any
    pub name: Option<String>,
    pub visited_at: i64,
}

/// Remote customer directory
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> RemoteResult<Option<CustomerRecord>>;

    /// Increment `total_visits`, set `last_visit` and refresh `name`
    async fn record_visit(&self, customer_id: &str, visit: &CustomerVisit) -> RemoteResult<()>;

    /// Insert a first-time customer with one visit
    async fn insert(&self, customer: &Customer, phone: &str, visited_at: i64) -> RemoteResult<()>;
}

/// What an enrichment run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    VisitRecorded,
    Inserted,
}

/// Fires directory updates for committed orders
#[derive(Clone)]
pub struct CustomerEnricher {
    directory: Arc<dyn CustomerDirectory>,
    connectivity: Connectivity,
    timeout: Duration,
}

impl std::fmt::Debug for CustomerEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerEnricher")
            .field("directory", &"<dyn CustomerDirectory>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CustomerEnricher {
    pub fn new(
        directory: Arc<dyn CustomerDirectory>,
        connectivity: Connectivity,
        timeout: Duration,
    ) -> Self {
        Self {
            directory,
            connectivity,
            timeout,
        }
    }

    /// Fire and forget enrichment for a committed order
    ///
    /// Returns whether a task was spawned. Nothing happens when the order has
    /// no customer phone, when offline, or outside a tokio runtime.
    pub fn spawn(&self, order: &Order) -> bool {
        let Some(customer) = order.customer.clone() else {
            return false;
        };
        let Some(phone) = customer.normalized_phone().map(str::to_string) else {
            return false;
        };
        if !self.connectivity.is_online() {
            tracing::debug!(order_id = %order.id, "Offline, skipping customer enrichment");
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(order_id = %order.id, "No async runtime, skipping customer enrichment");
            return false;
        };

        let enricher = self.clone();
        let order_id = order.id.clone();
        handle.spawn(async move {
            match tokio::time::timeout(enricher.timeout, enricher.enrich(&customer, &phone)).await {
                Ok(Ok(outcome)) => {
                    tracing::debug!(order_id = %order_id, outcome = ?outcome, "Customer enriched");
                }
                Ok(Err(e)) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Customer enrichment failed");
                }
                Err(_) => {
                    tracing::warn!(order_id = %order_id, "Customer enrichment timed out");
                }
            }
        });
        true
    }

    /// Look the phone up and record a visit or insert the customer
    pub async fn enrich(&self, customer: &Customer, phone: &str) -> RemoteResult<EnrichOutcome> {
        let now = now_millis();
        match self.directory.find_by_phone(phone).await? {
            Some(record) => {
                let visit = CustomerVisit {
                    name: customer.name.clone().or(record.name),
                    visited_at: now,
                };
                self.directory.record_visit(&record.id, &visit).await?;
                Ok(EnrichOutcome::VisitRecorded)
            }
            None => {
                self.directory.insert(customer, phone, now).await?;
                Ok(EnrichOutcome::Inserted)
            }
        }
    }
}
