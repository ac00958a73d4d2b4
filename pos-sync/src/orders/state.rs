//! Order status state machine
//!
//! ```text
//! DRAFT ──send ticket──▶ NEW ──bill──▶ BILLED
//!                         │              │
//!                         └───cancel─────┴──▶ CANCELLED
//!
//! DRAFT | NEW | BILLED | CANCELLED ──archive──▶ ARCHIVED ──restore──▶ original_status
//! DRAFT | ARCHIVED ──permanent delete──▶ ⊥
//! ```
//!
//! Re-saving a DRAFT is not a transition; it goes through `update_order`.

use super::error::{OrderError, OrderResult};
use shared::order::{Order, OrderStatus};

/// A status change requested by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// DRAFT → NEW
    SendTicket,
    /// NEW → BILLED
    Bill,
    /// NEW | BILLED → CANCELLED
    Cancel,
    /// any non-archived status → ARCHIVED
    Archive,
    /// ARCHIVED → original_status
    Restore,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::SendTicket => "send ticket for",
            Transition::Bill => "bill",
            Transition::Cancel => "cancel",
            Transition::Archive => "archive",
            Transition::Restore => "restore",
        }
    }
}

/// Target status of a transition, or `InvalidState` if it is not legal
pub fn next_status(
    current: OrderStatus,
    transition: Transition,
    original_status: Option<OrderStatus>,
) -> OrderResult<OrderStatus> {
    use OrderStatus::*;

    let next = match (current, transition) {
        (Draft, Transition::SendTicket) => Some(New),
        (New, Transition::Bill) => Some(Billed),
        (New | Billed, Transition::Cancel) => Some(Cancelled),
        (Draft | New | Billed | Cancelled, Transition::Archive) => Some(Archived),
        // An archived order never has ARCHIVED as its restore target
        (Archived, Transition::Restore) => original_status.filter(|s| *s != Archived),
        _ => None,
    };

    next.ok_or(OrderError::InvalidState {
        action: transition.name(),
        status: current,
    })
}

/// Apply a transition to an order in place
///
/// Archiving snapshots the current status into `original_status` and stamps
/// `archived_at`; restoring reverses both. `remote_id` and `sync_history` are
/// never touched here.
pub fn apply_transition(order: &mut Order, transition: Transition, now: i64) -> OrderResult<()> {
    let next = next_status(order.status, transition, order.original_status)?;

    match transition {
        Transition::Archive => {
            order.original_status = Some(order.status);
            order.archived_at = Some(now);
        }
        Transition::Restore => {
            order.original_status = None;
            order.archived_at = None;
        }
        _ => {}
    }

    order.status = next;
    order.updated_at = now;
    Ok(())
}

/// Whether an order may be permanently deleted (discarded draft or archived)
pub fn can_delete(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Draft | OrderStatus::Archived)
}
