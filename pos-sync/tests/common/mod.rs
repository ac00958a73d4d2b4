//! 集成测试公共工具 - in-process backend and customer directory

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pos_sync::enrichment::{CustomerDirectory, CustomerRecord, CustomerVisit};
use pos_sync::remote::{RemoteError, RemoteOrderRepository, RemoteResult};
use pos_sync::{GstConfig, GstMode, OrderStorage, OrdersManager, RetryPolicy};
use rust_decimal::Decimal;
use shared::order::{Customer, Order};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Backend that keeps orders in memory
#[derive(Default)]
pub struct MockBackend {
    /// remote_id -> latest payload
    pub orders: Mutex<HashMap<String, Order>>,
    /// local id of every create call, in call order
    pub creates: Mutex<Vec<String>>,
    /// remote id of every update call, in call order
    pub updates: Mutex<Vec<String>>,
    /// errors returned by the next writes, before normal behavior resumes
    pub failures: Mutex<VecDeque<RemoteError>>,
    pub down: AtomicBool,
    pub latency: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
}

impl MockBackend {
    pub fn fail_next(&self, error: RemoteError) {
        self.failures.lock().push_back(error);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().len()
    }

    pub fn remote_order(&self, remote_id: &str) -> Option<Order> {
        self.orders.lock().get(remote_id).cloned()
    }

    async fn before_write(&self) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Connectivity("connection refused".into()));
        }
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteOrderRepository for MockBackend {
    async fn create_order(&self, order: &Order) -> RemoteResult<String> {
        self.creates.lock().push(order.id.clone());
        self.before_write().await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let remote_id = format!("srv-{n}");
        self.orders.lock().insert(remote_id.clone(), order.clone());
        Ok(remote_id)
    }

    async fn update_order(&self, remote_id: &str, order: &Order) -> RemoteResult<()> {
        self.updates.lock().push(remote_id.to_string());
        self.before_write().await?;
        let mut orders = self.orders.lock();
        match orders.get_mut(remote_id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(RemoteError::from_status(404, format!("order {remote_id} not found"))),
        }
    }

    async fn ping(&self) -> RemoteResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(RemoteError::Connectivity("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

/// Customer directory keyed by phone
#[derive(Default)]
pub struct MockDirectory {
    pub customers: Mutex<Vec<CustomerRecord>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl CustomerDirectory for MockDirectory {
    async fn find_by_phone(&self, phone: &str) -> RemoteResult<Option<CustomerRecord>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::from_status(500, "directory down"));
        }
        Ok(self.customers.lock().iter().find(|c| c.phone == phone).cloned())
    }

    async fn record_visit(&self, customer_id: &str, visit: &CustomerVisit) -> RemoteResult<()> {
        if let Some(record) = self
            .customers
            .lock()
            .iter_mut()
            .find(|c| c.id == customer_id)
        {
            record.total_visits += 1;
            record.last_visit = Some(visit.visited_at);
            record.name = visit.name.clone();
        }
        Ok(())
    }

    async fn insert(&self, customer: &Customer, phone: &str, visited_at: i64) -> RemoteResult<()> {
        let mut customers = self.customers.lock();
        let id = format!("cust-{}", customers.len() + 1);
        customers.push(CustomerRecord {
            id,
            name: customer.name.clone(),
            phone: phone.to_string(),
            email: customer.email.clone(),
            total_visits: 1,
            last_visit: Some(visited_at),
        });
        Ok(())
    }
}

/// Retry policy without waiting, so tests can drain repeatedly
pub fn immediate_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

/// In-memory manager with exclusive 5% GST
pub fn create_test_manager(retry: RetryPolicy) -> OrdersManager {
    let gst = GstConfig::new(GstMode::Exclusive, Decimal::from(5)).expect("valid gst");
    let storage = OrderStorage::open_in_memory().expect("in-memory store");
    OrdersManager::new(storage, gst, retry)
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
