//! redb-based local durable store for orders and their pending remote writes
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Current local state of every order |
//! | `mutations` | `order_id` | `Mutation` | Pending remote writes (at most one per order) |
//! | `dead_letter` | `order_id` | `DeadLetterEntry` | Writes removed from automatic retry |
//! | `sequence_counter` | name | `u64` | Queue sequence and order-number counter |
//!
//! Keying `mutations` and `dead_letter` by order id is what makes "one pending
//! write per order" structural rather than a convention.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate` by default: once `commit()`
//! returns the data survives power loss, which matters on a till that gets
//! unplugged at closing time.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::order::{DeadLetterEntry, Mutation, Order};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Pending mutations: key = order_id, value = JSON-serialized Mutation
const MUTATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("mutations");

/// Dead letter queue: key = order_id, value = JSON-serialized DeadLetterEntry
const DEAD_LETTER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dead_letter");

/// Counters: key = counter name, value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const QUEUE_SEQUENCE_KEY: &str = "queue_seq";
const ORDER_COUNT_KEY: &str = "order_count";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Local order store backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStorage").finish_non_exhaustive()
    }
}

impl OrderStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and throwaway sessions)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(MUTATIONS_TABLE)?;
            let _ = write_txn.open_table(DEAD_LETTER_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(QUEUE_SEQUENCE_KEY)?.is_none() {
                seq_table.insert(QUEUE_SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    ///
    /// redb admits a single writer at a time, so every read-modify-write done
    /// inside one of these is serialized against all other writers.
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Counters ==========

    /// Increment and return the queue sequence (within transaction)
    pub fn next_queue_sequence(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        Self::increment(txn, QUEUE_SEQUENCE_KEY)
    }

    /// Increment and return the order counter used in order numbers (within transaction)
    pub fn next_order_count(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        Self::increment(txn, ORDER_COUNT_KEY)
    }

    fn increment(txn: &WriteTransaction, key: &str) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table.get(key)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(key, next)?;
        Ok(next)
    }

    // ========== Orders ==========

    /// Store an order (insert or overwrite)
    pub fn store_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by ID (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get all orders, newest first
    pub fn get_all_orders(&self) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let order: Order = serde_json::from_slice(value.value())?;
            orders.push(order);
        }

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Remove an order, returns whether it existed
    pub fn remove_order(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let existed = table.remove(order_id)?.is_some();
        Ok(existed)
    }

    // ========== Mutations ==========

    /// Store a mutation (insert or overwrite the one for its order)
    pub fn store_mutation(&self, txn: &WriteTransaction, mutation: &Mutation) -> StorageResult<()> {
        let mut table = txn.open_table(MUTATIONS_TABLE)?;
        let value = serde_json::to_vec(mutation)?;
        table.insert(mutation.order_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get the pending mutation for an order
    pub fn get_mutation(&self, order_id: &str) -> StorageResult<Option<Mutation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MUTATIONS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get the pending mutation for an order (within transaction)
    pub fn get_mutation_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Mutation>> {
        let table = txn.open_table(MUTATIONS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get all pending mutations in FIFO order
    pub fn get_pending_mutations(&self) -> StorageResult<Vec<Mutation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MUTATIONS_TABLE)?;

        let mut mutations = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let mutation: Mutation = serde_json::from_slice(value.value())?;
            mutations.push(mutation);
        }

        mutations.sort_by_key(Mutation::queue_key);
        Ok(mutations)
    }

    /// Get all pending mutations in FIFO order (within transaction)
    pub fn get_pending_mutations_txn(&self, txn: &WriteTransaction) -> StorageResult<Vec<Mutation>> {
        let table = txn.open_table(MUTATIONS_TABLE)?;

        let mut mutations = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let mutation: Mutation = serde_json::from_slice(value.value())?;
            mutations.push(mutation);
        }

        mutations.sort_by_key(Mutation::queue_key);
        Ok(mutations)
    }

    /// Remove the pending mutation for an order, returns whether it existed
    pub fn remove_mutation(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let mut table = txn.open_table(MUTATIONS_TABLE)?;
        let existed = table.remove(order_id)?.is_some();
        Ok(existed)
    }

    // ========== Dead Letter Queue ==========

    /// Store a dead letter entry
    pub fn store_dead_letter(
        &self,
        txn: &WriteTransaction,
        entry: &DeadLetterEntry,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(DEAD_LETTER_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert(entry.order_id(), value.as_slice())?;
        Ok(())
    }

    /// Remove and return the dead letter entry for an order (within transaction)
    pub fn take_dead_letter(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<DeadLetterEntry>> {
        let mut table = txn.open_table(DEAD_LETTER_TABLE)?;

        // Read and clone first to avoid borrow conflict
        let entry_opt = match table.get(order_id)? {
            Some(value) => Some(serde_json::from_slice::<DeadLetterEntry>(value.value())?),
            None => None,
        };

        if entry_opt.is_some() {
            table.remove(order_id)?;
        }
        Ok(entry_opt)
    }

    /// Get all dead letter entries, oldest failure first
    pub fn get_dead_letters(&self) -> StorageResult<Vec<DeadLetterEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTER_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let entry: DeadLetterEntry = serde_json::from_slice(value.value())?;
            entries.push(entry);
        }

        entries.sort_by_key(|e| e.failed_at);
        Ok(entries)
    }

    // ========== Statistics ==========

    /// Get storage statistics
    pub fn get_stats(&self) -> StorageResult<StorageStats> {
        let read_txn = self.db.begin_read()?;

        let orders_table = read_txn.open_table(ORDERS_TABLE)?;
        let mutations_table = read_txn.open_table(MUTATIONS_TABLE)?;
        let dead_letter_table = read_txn.open_table(DEAD_LETTER_TABLE)?;
        let seq_table = read_txn.open_table(SEQUENCE_TABLE)?;

        Ok(StorageStats {
            order_count: orders_table.len()?,
            pending_mutation_count: mutations_table.len()?,
            dead_letter_count: dead_letter_table.len()?,
            queue_sequence: seq_table
                .get(QUEUE_SEQUENCE_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0),
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub order_count: u64,
    pub pending_mutation_count: u64,
    pub dead_letter_count: u64,
    pub queue_sequence: u64,
}
