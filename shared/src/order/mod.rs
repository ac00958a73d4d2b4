//! Order model shared between the local store, the sync queue and the backend
//!
//! - `types`: status enums (order status, sync state, mutation operation)
//! - `snapshot`: the order itself, its line items and customer
//! - `mutation`: queued remote writes and their dead-letter records

pub mod mutation;
pub mod snapshot;
pub mod types;

// Re-exports
pub use mutation::{DeadLetterEntry, DeadLetterReason, Mutation};
pub use snapshot::{Customer, Order, OrderItem, OrderType, SyncRecord};
pub use types::*;
