//! Order snapshot - the full local state of one order
//!
//! The same struct is persisted locally, carried as the payload of queued
//! mutations, and sent to the backend. Mutations always carry a full
//! snapshot, never a diff.

use super::types::{MutationOp, OrderStatus, SyncState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the order is served
///
/// Each variant carries only the fields that are meaningful for it, so a
/// takeaway order with a table, or a dine-in order without one, cannot be
/// represented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    DineIn {
        table_reference: String,
        people_count: u32,
    },
    Takeaway,
    Delivery,
}

impl OrderType {
    pub fn dine_in(table_reference: impl Into<String>, people_count: u32) -> Self {
        OrderType::DineIn {
            table_reference: table_reference.into(),
            people_count,
        }
    }

    pub fn is_dine_in(&self) -> bool {
        matches!(self, OrderType::DineIn { .. })
    }

    pub fn table_reference(&self) -> Option<&str> {
        match self {
            OrderType::DineIn {
                table_reference, ..
            } => Some(table_reference),
            _ => None,
        }
    }

    /// Guest count; always 0 for takeaway and delivery
    pub fn people_count(&self) -> u32 {
        match self {
            OrderType::DineIn { people_count, .. } => *people_count,
            _ => 0,
        }
    }
}

/// Customer attached to an order (all fields optional, phone is the lookup key)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Customer {
    /// Phone number with surrounding whitespace removed, if non-empty
    pub fn normalized_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// One cart line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub menu_item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderItem {
    pub fn new(menu_item_id: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            menu_item_id: menu_item_id.into(),
            variant_name: None,
            quantity,
            unit_price,
            notes: None,
        }
    }

    pub fn with_variant(mut self, variant_name: impl Into<String>) -> Self {
        self.variant_name = Some(variant_name.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Two lines with the same menu item and variant are the same cart line
    pub fn same_line(&self, other: &OrderItem) -> bool {
        self.menu_item_id == other.menu_item_id && self.variant_name == other.variant_name
    }

    /// `unit_price × quantity`, unrounded
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A confirmed remote write (append-only history)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRecord {
    pub at: i64,
    pub operation: MutationOp,
    pub remote_id: String,
}

/// Order - full local state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Local id, stable for the order's lifetime
    pub id: String,
    /// Human-readable number generated at creation, never changed
    pub order_number: String,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    pub items: Vec<OrderItem>,

    // === Totals (computed) ===
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,

    // === Status ===
    pub status: OrderStatus,
    /// Status before archiving; restore target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_status: Option<OrderStatus>,

    // === Sync metadata ===
    pub sync_state: SyncState,
    /// Backend id, set once by a successful remote create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_history: Vec<SyncRecord>,

    // === Timestamps (Unix millis) ===
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<i64>,
}

impl Order {
    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }

    /// Total quantity across all lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}
