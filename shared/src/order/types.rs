//! Status enums for orders and their sync bookkeeping

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Status
// ============================================================================

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Saved but not sent to the kitchen; may be re-saved indefinitely
    #[default]
    Draft,
    /// Ticket sent
    New,
    Billed,
    Cancelled,
    /// Hidden from the active views; `original_status` holds the restore target
    Archived,
}

impl OrderStatus {
    /// Whether line items, order type and customer may still change
    pub fn is_editable(self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::New)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Draft => write!(f, "DRAFT"),
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::Billed => write!(f, "BILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Archived => write!(f, "ARCHIVED"),
        }
    }
}

// ============================================================================
// Sync State
// ============================================================================

/// Remote sync state of an order, orthogonal to [`OrderStatus`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// Local changes not yet confirmed by the backend
    #[default]
    Unsynced,
    /// A remote write is in flight
    Syncing,
    Synced,
    /// Retries exhausted or the backend rejected the write; needs an operator
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Unsynced => write!(f, "unsynced"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Mutation Operation
// ============================================================================

/// Kind of remote write a queued mutation performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationOp {
    Create,
    Update,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Create => write!(f, "create"),
            MutationOp::Update => write!(f, "update"),
        }
    }
}
