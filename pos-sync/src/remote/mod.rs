//! Remote order repository
//!
//! The backend is reached through [`RemoteOrderRepository`]; the sync worker
//! only sees this trait. [`http::HttpOrderRepository`] binds it to REST.

pub mod http;

pub use http::{HttpCustomerDirectory, HttpOrderRepository};

use async_trait::async_trait;
use shared::order::Order;
use std::time::Duration;
use thiserror::Error;

/// Remote write failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Backend unreachable (DNS, refused connection, reset)
    #[error("Connection failed: {0}")]
    Connectivity(String),

    /// 5xx, 408 or 429
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other 4xx: the backend refused this payload
    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// 2xx with a body we cannot use (e.g. create without an id)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => RemoteError::Server { status, message },
            _ => RemoteError::Rejected { status, message },
        }
    }

    /// Whether the same write may succeed if tried again later
    ///
    /// An unusable success response is not retried: the backend may already
    /// have created the order, and a blind retry would create it twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout(_) | RemoteError::Connectivity(_) | RemoteError::Server { .. }
        )
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Backend order API
#[async_trait]
pub trait RemoteOrderRepository: Send + Sync {
    /// Create the order remotely, returning the backend-assigned id
    async fn create_order(&self, order: &Order) -> RemoteResult<String>;

    /// Overwrite the remote order identified by `remote_id`
    async fn update_order(&self, remote_id: &str, order: &Order) -> RemoteResult<()>;

    /// Cheap reachability check
    async fn ping(&self) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for status in [408, 429, 500, 502, 503, 599] {
            assert!(RemoteError::from_status(status, "").is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 409, 422] {
            let err = RemoteError::from_status(status, "bad");
            assert!(!err.is_retryable(), "{status}");
            assert!(matches!(err, RemoteError::Rejected { .. }));
        }
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(RemoteError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(RemoteError::Connectivity("refused".into()).is_retryable());
        assert!(!RemoteError::InvalidResponse("missing id".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RemoteError::Timeout(Duration::from_secs(10)).to_string(),
            "Request timed out after 10000ms"
        );
        assert_eq!(
            RemoteError::from_status(503, "down").to_string(),
            "Server error 503: down"
        );
    }
}
