//! Local-first order model
//!
//! - **manager**: [`OrdersManager`], the only write path for orders
//! - **queue**: [`MutationQueue`], pending remote writes with dead letters
//! - **storage**: redb persistence for orders, mutations and counters
//! - **state**: status state machine
//! - **money**: GST totals and cart validation
//!
//! # Architecture
//!
//! ```text
//! UI ──▶ OrdersManager ──▶ redb txn { order + mutation } ──▶ SyncTrigger
//!                                          │
//!                         SyncWorker ◀─────┘ dequeue / mark_* (same store)
//! ```

pub mod error;
pub mod manager;
pub mod money;
pub mod queue;
pub mod state;
pub mod storage;

// Re-exports
pub use error::{OrderError, OrderResult};
pub use manager::{OrderDraft, OrderIntent, OrderPatch, OrdersManager};
pub use money::{GstConfig, GstMode, Totals, compute_totals};
pub use queue::{FailureOutcome, MutationQueue, RetryPolicy, SyncOutcome};
pub use state::Transition;
pub use storage::{OrderStorage, StorageError, StorageResult, StorageStats};

// Re-export shared types for convenience
pub use shared::order::{
    Customer, DeadLetterEntry, DeadLetterReason, Mutation, MutationOp, Order, OrderItem,
    OrderStatus, OrderType, SyncRecord, SyncState,
};
