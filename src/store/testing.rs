//! Fault-injecting store wrappers for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::order::{Order, OrderPatch};
use super::{OrderScan, OrderStore, QueryField, StoreError};

/// Sleeps before every call.
pub(crate) struct SlowOrderStore {
    inner: Arc<dyn OrderStore>,
    delay: Duration,
}

impl SlowOrderStore {
    pub(crate) fn new(inner: Arc<dyn OrderStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl OrderStore for SlowOrderStore {
    fn generate_id(&self) -> String {
        self.inner.generate_id()
    }

    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(order).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_by_id(id).await
    }

    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.query_by_field(field, value).await
    }

    async fn scan(&self) -> Result<OrderScan, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.scan().await
    }

    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_partial(id, patch).await
    }
}

/// Fails `update_partial` for chosen ids, optionally drops every `put`,
/// and counts the patches that reach the inner store.
pub(crate) struct FlakyOrderStore {
    inner: Arc<dyn OrderStore>,
    failing_ids: HashSet<String>,
    drop_puts: bool,
    patches: AtomicUsize,
}

impl FlakyOrderStore {
    pub(crate) fn new(inner: Arc<dyn OrderStore>) -> Self {
        Self {
            inner,
            failing_ids: HashSet::new(),
            drop_puts: false,
            patches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub(crate) fn dropping_puts(mut self) -> Self {
        self.drop_puts = true;
        self
    }

    pub(crate) fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FlakyOrderStore {
    fn generate_id(&self) -> String {
        self.inner.generate_id()
    }

    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        if self.drop_puts {
            return Ok(());
        }
        self.inner.put(order).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError> {
        self.inner.query_by_field(field, value).await
    }

    async fn scan(&self) -> Result<OrderScan, StoreError> {
        self.inner.scan().await
    }

    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError> {
        if self.failing_ids.contains(id) {
            return Err(StoreError::Backend(format!("injected failure for {id}")));
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        self.inner.update_partial(id, patch).await
    }
}
