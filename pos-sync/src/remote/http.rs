//! REST bindings for the order backend and the customer directory
//!
//! | Call | Request |
//! |------|---------|
//! | create order | `POST {base}/orders` → `{ "id": "..." }` |
//! | update order | `PUT {base}/orders/{remote_id}` |
//! | health | `GET {base}/health` |
//! | find customer | `GET {base}/customers?phone=...` → `[CustomerRecord]` |
//! | record visit | `POST {base}/customers/{id}/visits` |
//! | insert customer | `POST {base}/customers` |

use super::{RemoteError, RemoteOrderRepository, RemoteResult};
use crate::enrichment::{CustomerDirectory, CustomerRecord, CustomerVisit};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use shared::order::{Customer, Order};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    #[serde(alias = "remote_id", alias = "_id")]
    id: String,
}

#[derive(Debug, Serialize)]
struct NewCustomerRequest<'a> {
    name: Option<&'a str>,
    phone: &'a str,
    email: Option<&'a str>,
    total_visits: u32,
    last_visit: i64,
}

/// Shared HTTP plumbing for both bindings
#[derive(Debug, Clone)]
struct RestClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RestClient {
    fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Connectivity(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Connectivity(e.to_string())
        }
    }

    /// Turn a non-success status into an error
    async fn check(&self, response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status.as_u16(), body))
    }

    async fn decode<T: serde::de::DeserializeOwned>(&self, response: Response) -> RemoteResult<T> {
        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse response: {e}")))
    }
}

/// [`RemoteOrderRepository`] over REST
#[derive(Debug, Clone)]
pub struct HttpOrderRepository {
    rest: RestClient,
}

impl HttpOrderRepository {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl RemoteOrderRepository for HttpOrderRepository {
    async fn create_order(&self, order: &Order) -> RemoteResult<String> {
        let response = self
            .rest
            .client
            .post(self.rest.url("/orders"))
            .json(order)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        let response = self.rest.check(response).await?;
        let created: CreateOrderResponse = self.rest.decode(response).await?;
        if created.id.trim().is_empty() {
            return Err(RemoteError::InvalidResponse(
                "create response carried an empty id".to_string(),
            ));
        }
        Ok(created.id)
    }

    async fn update_order(&self, remote_id: &str, order: &Order) -> RemoteResult<()> {
        let response = self
            .rest
            .client
            .put(self.rest.url(&format!("/orders/{remote_id}")))
            .json(order)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        self.rest.check(response).await?;
        Ok(())
    }

    async fn ping(&self) -> RemoteResult<()> {
        let response = self
            .rest
            .client
            .get(self.rest.url("/health"))
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        self.rest.check(response).await?;
        Ok(())
    }
}

/// [`CustomerDirectory`] over REST
#[derive(Debug, Clone)]
pub struct HttpCustomerDirectory {
    rest: RestClient,
}

impl HttpCustomerDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl CustomerDirectory for HttpCustomerDirectory {
    async fn find_by_phone(&self, phone: &str) -> RemoteResult<Option<CustomerRecord>> {
        let response = self
            .rest
            .client
            .get(self.rest.url("/customers"))
            .query(&[("phone", phone)])
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        let response = self.rest.check(response).await?;
        let records: Vec<CustomerRecord> = self.rest.decode(response).await?;
        Ok(records.into_iter().next())
    }

    async fn record_visit(&self, customer_id: &str, visit: &CustomerVisit) -> RemoteResult<()> {
        let response = self
            .rest
            .client
            .post(self.rest.url(&format!("/customers/{customer_id}/visits")))
            .json(visit)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        self.rest.check(response).await?;
        Ok(())
    }

    async fn insert(&self, customer: &Customer, phone: &str, visited_at: i64) -> RemoteResult<()> {
        let request = NewCustomerRequest {
            name: customer.name.as_deref(),
            phone,
            email: customer.email.as_deref(),
            total_visits: 1,
            last_visit: visited_at,
        };
        let response = self
            .rest
            .client
            .post(self.rest.url("/customers"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        self.rest.check(response).await?;
        Ok(())
    }
}
