use super::storage::StorageError;
use shared::order::OrderStatus;
use thiserror::Error;

/// Errors returned synchronously to callers of the order model
///
/// Remote sync failures never show up here; they surface only as the order's
/// `sync_state` and in the dead letter list.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Caller-fixable input problem; nothing was persisted
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Bad GST mode or percentage
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} order in {status} status")]
    InvalidState {
        action: &'static str,
        status: OrderStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl OrderError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrderError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        OrderError::Configuration(message.into())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
