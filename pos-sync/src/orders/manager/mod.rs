//! OrdersManager - local order model
//!
//! Every operation validates first, then commits the order and its pending
//! remote write in one redb transaction, then pokes the sync worker.
//!
//! ```text
//! create_order / update_order / transition
//!     ├─ 1. Validate (nothing persisted on failure)
//!     ├─ 2. Begin write transaction
//!     ├─ 3. Load order, apply change, recompute totals
//!     ├─ 4. Store order with sync_state = UNSYNCED
//!     ├─ 5. Enqueue mutation (collapses with any pending one)
//!     ├─ 6. Commit
//!     ├─ 7. Poke sync trigger
//!     └─ 8. Fire customer enrichment (create only)
//! ```
//!
//! Remote failures never reach callers here; they show up only as the
//! order's `sync_state` and in [`OrdersManager::failed_mutations`].


use super::error::{OrderError, OrderResult};
use super::money::{GstConfig, compute_totals, normalize_items, validate_order_type};
use super::queue::{MutationQueue, RetryPolicy};
use super::state::{Transition, apply_transition, can_delete};
use super::storage::{OrderStorage, StorageError, StorageStats};
use crate::enrichment::CustomerEnricher;
use crate::sync::SyncTrigger;
use chrono::Local;
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use shared::order::{
    Customer, DeadLetterEntry, Mutation, MutationOp, Order, OrderItem, OrderStatus, OrderType,
    SyncState,
};
use shared::util::{new_order_id, now_millis};
use std::path::Path;

/// Input for a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_type: OrderType,
    #[serde(default)]
    pub customer: Option<Customer>,
    pub items: Vec<OrderItem>,
}

/// Partial edit; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub order_type: Option<OrderType>,
    /// `Some(None)` clears the customer
    #[serde(default)]
    pub customer: Option<Option<Customer>>,
    #[serde(default)]
    pub items: Option<Vec<OrderItem>>,
}

/// Whether a new order is saved as a draft or sent straight to the kitchen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderIntent {
    Draft,
    New,
}

impl From<OrderIntent> for OrderStatus {
    fn from(intent: OrderIntent) -> Self {
        match intent {
            OrderIntent::Draft => OrderStatus::Draft,
            OrderIntent::New => OrderStatus::New,
        }
    }
}

/// Local order model handle
///
/// Cheap to clone; clones share the same store, queue and trigger.
#[derive(Clone)]
pub struct OrdersManager {
    storage: OrderStorage,
    queue: MutationQueue,
    gst: GstConfig,
    trigger: SyncTrigger,
    enricher: Option<CustomerEnricher>,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &"<OrderStorage>")
            .field("gst", &self.gst)
            .field("enricher", &self.enricher.is_some())
            .finish()
    }
}

impl OrdersManager {
    /// Create a manager over an opened store
    pub fn new(storage: OrderStorage, gst: GstConfig, retry: RetryPolicy) -> Self {
        let queue = MutationQueue::new(storage.clone(), retry);
        Self {
            storage,
            queue,
            gst,
            trigger: SyncTrigger::new(),
            enricher: None,
        }
    }

    /// Open (or create) the store at `db_path`
    pub fn open(db_path: impl AsRef<Path>, gst: GstConfig, retry: RetryPolicy) -> OrderResult<Self> {
        let storage = OrderStorage::open(db_path)?;
        Ok(Self::new(storage, gst, retry))
    }

    /// Set the customer enrichment channel
    pub fn set_enricher(&mut self, enricher: CustomerEnricher) {
        self.enricher = Some(enricher);
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    pub fn gst(&self) -> &GstConfig {
        &self.gst
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    /// Generate next order number (crash-safe via redb)
    ///
    /// `ORD-yyMMddHHmmss-NNNN`; the counter lives in the same transaction as
    /// the order, so a rolled back create does not burn a number.
    fn next_order_number(&self, txn: &WriteTransaction) -> OrderResult<String> {
        let count = self.storage.next_order_count(txn)?;
        let stamp = Local::now().format("%y%m%d%H%M%S");
        Ok(format!("ORD-{stamp}-{:04}", count % 10_000))
    }

    // ========== Commands ==========

    /// Validate and persist a new order, queueing its remote create
    pub fn create_order(&self, draft: OrderDraft, intent: OrderIntent) -> OrderResult<Order> {
        validate_order_type(&draft.order_type)?;
        let items = normalize_items(draft.items)?;
        let totals = compute_totals(&items, &self.gst);
        let now = now_millis();

        let txn = self.storage.begin_write()?;
        let order = Order {
            id: new_order_id(),
            order_number: self.next_order_number(&txn)?,
            order_type: draft.order_type,
            customer: draft.customer,
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            status: intent.into(),
            original_status: None,
            sync_state: SyncState::Unsynced,
            remote_id: None,
            sync_history: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        self.storage.store_order(&txn, &order)?;
        self.queue
            .enqueue_txn(&txn, &order.id, MutationOp::Create, order.clone())?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            status = %order.status,
            total = %order.total,
            "Order created"
        );
        self.after_commit(&order, true);
        Ok(order)
    }

    /// Edit a DRAFT or NEW order
    ///
    /// Totals are recomputed; `remote_id` and sync history are preserved.
    pub fn update_order(&self, order_id: &str, patch: OrderPatch) -> OrderResult<Order> {
        if let Some(order_type) = &patch.order_type {
            validate_order_type(order_type)?;
        }
        let items = patch.items.map(normalize_items).transpose()?;

        let txn = self.storage.begin_write()?;
        let mut order = self.load_for_write(&txn, order_id)?;
        if !order.status.is_editable() {
            return Err(OrderError::InvalidState {
                action: "edit",
                status: order.status,
            });
        }

        if let Some(order_type) = patch.order_type {
            order.order_type = order_type;
        }
        if let Some(customer) = patch.customer {
            order.customer = customer;
        }
        if let Some(items) = items {
            order.items = items;
        }
        let totals = compute_totals(&order.items, &self.gst);
        order.subtotal = totals.subtotal;
        order.tax = totals.tax;
        order.total = totals.total;
        order.updated_at = now_millis();

        self.commit_change(txn, &mut order, MutationOp::Update)?;
        tracing::info!(order_id = %order.id, total = %order.total, "Order updated");
        self.after_commit(&order, false);
        Ok(order)
    }

    /// DRAFT → NEW
    pub fn send_ticket(&self, order_id: &str) -> OrderResult<Order> {
        self.transition(order_id, Transition::SendTicket)
    }

    /// NEW → BILLED
    pub fn bill_order(&self, order_id: &str) -> OrderResult<Order> {
        self.transition(order_id, Transition::Bill)
    }

    /// NEW | BILLED → CANCELLED
    pub fn cancel_order(&self, order_id: &str) -> OrderResult<Order> {
        self.transition(order_id, Transition::Cancel)
    }

    pub fn archive_order(&self, order_id: &str) -> OrderResult<Order> {
        self.transition(order_id, Transition::Archive)
    }

    /// Return an archived order to the status it had before archiving
    pub fn restore_order(&self, order_id: &str) -> OrderResult<Order> {
        self.transition(order_id, Transition::Restore)
    }

    /// Remove a DRAFT or ARCHIVED order and any pending write for it
    ///
    /// A write already in flight is discarded when its result comes back.
    pub fn delete_order_permanently(&self, order_id: &str) -> OrderResult<()> {
        let txn = self.storage.begin_write()?;
        let order = self.load_for_write(&txn, order_id)?;
        if !can_delete(order.status) {
            return Err(OrderError::InvalidState {
                action: "delete",
                status: order.status,
            });
        }

        self.storage.remove_order(&txn, order_id)?;
        let had_mutation = self.queue.remove_txn(&txn, order_id)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_id = %order_id,
            status = %order.status,
            dropped_pending_write = had_mutation,
            "Order permanently deleted"
        );
        Ok(())
    }

    fn transition(&self, order_id: &str, transition: Transition) -> OrderResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut order = self.load_for_write(&txn, order_id)?;
        let from = order.status;
        apply_transition(&mut order, transition, now_millis())?;

        self.commit_change(txn, &mut order, MutationOp::Update)?;
        tracing::info!(order_id = %order.id, from = %from, to = %order.status, "Order status changed");
        self.after_commit(&order, false);
        Ok(order)
    }

    /// Load an order inside a write transaction, or fail with `NotFound`
    ///
    /// Dropping the transaction on the error path aborts it.
    fn load_for_write(&self, txn: &WriteTransaction, order_id: &str) -> OrderResult<Order> {
        self.storage.get_order_txn(txn, order_id)?.ok_or_else(|| {
            tracing::warn!(order_id = %order_id, "Order not found");
            OrderError::NotFound(order_id.to_string())
        })
    }

    /// Store a changed order as UNSYNCED with its mutation, and commit
    fn commit_change(
        &self,
        txn: WriteTransaction,
        order: &mut Order,
        operation: MutationOp,
    ) -> OrderResult<()> {
        order.sync_state = SyncState::Unsynced;
        self.storage.store_order(&txn, order)?;
        self.queue
            .enqueue_txn(&txn, &order.id, operation, order.clone())?;
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn after_commit(&self, order: &Order, enrich: bool) {
        self.trigger.poke();
        if enrich && let Some(enricher) = &self.enricher {
            enricher.spawn(order);
        }
    }

    // ========== Queries ==========

    pub fn get_order(&self, order_id: &str) -> OrderResult<Option<Order>> {
        Ok(self.storage.get_order(order_id)?)
    }

    /// All orders, newest first
    pub fn list_orders(&self) -> OrderResult<Vec<Order>> {
        Ok(self.storage.get_all_orders()?)
    }

    pub fn sync_status(&self, order_id: &str) -> OrderResult<SyncState> {
        match self.storage.get_order(order_id)? {
            Some(order) => Ok(order.sync_state),
            None => {
                tracing::warn!(order_id = %order_id, "Order not found");
                Err(OrderError::NotFound(order_id.to_string()))
            }
        }
    }

    /// Writes waiting for the backend, FIFO
    pub fn pending_mutations(&self) -> OrderResult<Vec<Mutation>> {
        Ok(self.queue.pending()?)
    }

    /// Writes that left automatic retry
    pub fn failed_mutations(&self) -> OrderResult<Vec<DeadLetterEntry>> {
        Ok(self.queue.dead_letters()?)
    }

    /// Put a dead-lettered write back in the queue with a fresh attempt budget
    pub fn retry_failed(&self, order_id: &str) -> OrderResult<()> {
        if !self.queue.retry_dead_letter(order_id)? {
            tracing::warn!(order_id = %order_id, "No failed mutation to retry");
            return Err(OrderError::NotFound(order_id.to_string()));
        }
        self.trigger.poke();
        Ok(())
    }

    pub fn stats(&self) -> OrderResult<StorageStats> {
        Ok(self.storage.get_stats()?)
    }
}
