//! Shared types for the POS order sync engine
//!
//! Plain data types used by the engine and by anything that talks to it:
//! orders, line items, queued mutations and their dead-letter records.
//! Nothing in this crate performs I/O.

pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use order::{
    Customer, DeadLetterEntry, DeadLetterReason, Mutation, MutationOp, Order, OrderItem,
    OrderStatus, OrderType, SyncRecord, SyncState,
};
