use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::order::{Order, OrderPatch};
use crate::metrics::OrderMetrics;
use super::{OrderScan, OrderStore, QueryField, StoreError};

// ============================================================================
// Timed Order Store - per-call timeout and latency metrics
// ============================================================================
//
// Wraps any OrderStore. Every call is bounded by `timeout`; an expired call
// surfaces as StoreError::Timeout. The underlying write may still land, so
// callers must treat a timed-out write as "outcome unknown".
//
// ============================================================================

pub struct TimedOrderStore {
    inner: Arc<dyn OrderStore>,
    timeout: Duration,
    metrics: Arc<OrderMetrics>,
}

impl TimedOrderStore {
    pub fn new(inner: Arc<dyn OrderStore>, timeout: Duration, metrics: Arc<OrderMetrics>) -> Self {
        Self {
            inner,
            timeout,
            metrics,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_store_call(operation, elapsed, result.as_ref().err());

        if let Err(e) = &result {
            tracing::debug!(operation, error = %e, elapsed_secs = elapsed, "Store call failed");
        }

        result
    }
}

#[async_trait]
impl OrderStore for TimedOrderStore {
    fn generate_id(&self) -> String {
        self.inner.generate_id()
    }

    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        self.bounded("put", self.inner.put(order)).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError> {
        self.bounded("get_by_id", self.inner.get_by_id(id)).await
    }

    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError> {
        self.bounded("query_by_field", self.inner.query_by_field(field, value)).await
    }

    async fn scan(&self) -> Result<OrderScan, StoreError> {
        self.bounded("scan", self.inner.scan()).await
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        self.bounded("get_all", self.inner.get_all()).await
    }

    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError> {
        self.bounded("update_partial", self.inner.update_partial(id, patch)).await
    }
}
