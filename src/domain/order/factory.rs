use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::metrics::OrderMetrics;
use crate::store::{OrderStore, StoreError};
use crate::utils::{retry_on_transient, RetryConfig};
use super::errors::OrderError;
use super::value_objects::{NewOrder, Order, OrderStatus, SellerRefs};

// ============================================================================
// Order Factory
// ============================================================================
//
// Validate → assign id → write → read back.
//
// The read-back guards against a store that acknowledges a write it never
// kept. There is no deduplication: the same input twice is two orders.
//
// ============================================================================

pub struct OrderFactory {
    store: Arc<dyn OrderStore>,
    metrics: Arc<OrderMetrics>,
    verify_retry: RetryConfig,
}

impl OrderFactory {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<OrderMetrics>) -> Self {
        Self {
            store,
            metrics,
            verify_retry: RetryConfig::read_after_write(),
        }
    }

    pub fn with_verify_retry(mut self, config: RetryConfig) -> Self {
        self.verify_retry = config;
        self
    }

    /// Create and persist a new order, returning its id.
    pub async fn create(&self, input: NewOrder) -> Result<String, OrderError> {
        let missing = input.missing_fields();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Rejected order input");
            self.metrics.record_validation_failure(&missing);
            return Err(OrderError::MissingFields(missing));
        }

        let order_id = self.store.generate_id();
        let order = assemble(order_id.clone(), input, Utc::now());

        self.store.put(&order).await?;
        self.confirm_persisted(&order_id).await?;

        self.metrics.record_order_created();
        tracing::info!(
            order_id = %order_id,
            user_id = %order.user_id,
            item_count = order.items.len(),
            total_amount = order.total_amount,
            status = ?order.status,
            "✅ Order created"
        );

        Ok(order_id)
    }

    async fn confirm_persisted(&self, order_id: &str) -> Result<(), OrderError> {
        let store = &self.store;

        retry_on_transient(self.verify_retry.clone(), |_attempt| store.get_by_id(order_id))
            .await
            .into_result()
            .map(|_| ())
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    tracing::error!(order_id = %order_id, "Order write was acknowledged but not found on read-back");
                    OrderError::Persistence(StoreError::Backend(format!(
                        "write for order {order_id} was not confirmed"
                    )))
                }
                other => other.into(),
            })
    }
}

/// Build the record for validated input.
fn assemble(id: String, input: NewOrder, now: DateTime<Utc>) -> Order {
    Order {
        id,
        user_id: input.user_id.unwrap_or_default(),
        seller_id: input.seller_id,
        seller_ids: input.seller_ids.map(SellerRefs::Set),
        items: input.items,
        total_amount: input.total_amount.unwrap_or_default(),
        status: Some(input.status.unwrap_or(OrderStatus::Pending)),
        created_at: Some(now),
        updated_at: None,
        version: 0,
        details: input.details,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderItem;
    use crate::store::testing::FlakyOrderStore;
    use crate::store::{InMemoryOrderStore, QueryField};
    use serde_json::json;
    use std::time::Duration;

    fn item(seller: &str, price: f64, quantity: f64) -> OrderItem {
        OrderItem {
            id: Some(format!("p-{seller}")),
            name: "Widget".to_string(),
            price,
            quantity,
            seller_id: Some(seller.to_string()),
            ..OrderItem::default()
        }
    }

    fn valid_input() -> NewOrder {
        NewOrder {
            user_id: Some("u1".to_string()),
            items: vec![item("s1", 999.0, 1.0), item("s2", 1499.0, 2.0)],
            total_amount: Some(3997.0),
            ..NewOrder::default()
        }
    }

    fn factory(store: Arc<dyn OrderStore>) -> OrderFactory {
        OrderFactory::new(store, Arc::new(OrderMetrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_create_defaults_to_pending() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = factory(store.clone()).create(valid_input()).await.unwrap();

        let order = store.get_by_id(&id).await.unwrap();
        assert_eq!(order.status, Some(OrderStatus::Pending));
        assert_eq!(order.user_id, "u1");
        assert_eq!(order.version, 0);
        assert!(order.created_at.is_some());
    }

    #[tokio::test]
    async fn test_create_honours_explicit_status() {
        let store = Arc::new(InMemoryOrderStore::new());
        let input = NewOrder {
            status: Some(OrderStatus::Processing),
            ..valid_input()
        };

        let id = factory(store.clone()).create(input).await.unwrap();
        assert_eq!(store.get_by_id(&id).await.unwrap().status, Some(OrderStatus::Processing));
    }

    #[tokio::test]
    async fn test_missing_user_is_rejected_and_nothing_persisted() {
        let store = Arc::new(InMemoryOrderStore::new());
        let input = NewOrder {
            user_id: None,
            ..valid_input()
        };

        let err = factory(store.clone()).create(input).await.unwrap_err();
        assert!(matches!(err, OrderError::MissingFields(ref f) if f == &vec!["userId"]));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_empty_items_is_rejected() {
        let store = Arc::new(InMemoryOrderStore::new());
        let input = NewOrder {
            items: vec![],
            ..valid_input()
        };

        let err = factory(store.clone()).create(input).await.unwrap_err();
        assert!(matches!(err, OrderError::MissingFields(ref f) if f == &vec!["items"]));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_missing_total_is_rejected_and_counted() {
        let store = Arc::new(InMemoryOrderStore::new());
        let metrics = Arc::new(OrderMetrics::new().unwrap());
        let factory = OrderFactory::new(store.clone(), metrics.clone());
        let input = NewOrder {
            total_amount: None,
            ..valid_input()
        };

        let err = factory.create(input).await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty().unwrap());
        assert_eq!(metrics.validation_failures.with_label_values(&["totalAmount"]).get(), 1);
    }

    #[tokio::test]
    async fn test_total_amount_is_never_recomputed() {
        let store = Arc::new(InMemoryOrderStore::new());
        let input = NewOrder {
            total_amount: Some(5000.0),
            ..valid_input()
        };

        let id = factory(store.clone()).create(input).await.unwrap();
        let order = store.get_by_id(&id).await.unwrap();

        assert_eq!(order.items_subtotal(), 3997.0);
        assert_eq!(order.total_amount, 5000.0);
    }

    // Creation is intentionally non-idempotent.
    #[tokio::test]
    async fn test_identical_input_creates_two_orders() {
        let store = Arc::new(InMemoryOrderStore::new());
        let factory = factory(store.clone());

        let first = factory.create(valid_input()).await.unwrap();
        let second = factory.create(valid_input()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.query_by_field(QueryField::UserId, "u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pass_through_details_are_stored() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut input = valid_input();
        input.details.insert("paymentMethod".to_string(), json!("card"));

        let id = factory(store.clone()).create(input).await.unwrap();
        let raw = store.raw(&id).unwrap().unwrap();
        assert_eq!(raw["paymentMethod"], json!("card"));
    }

    #[tokio::test]
    async fn test_dropped_write_is_a_persistence_error() {
        let flaky = Arc::new(FlakyOrderStore::new(Arc::new(InMemoryOrderStore::new())).dropping_puts());
        let factory = factory(flaky).with_verify_retry(RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        });

        let err = factory.create(valid_input()).await.unwrap_err();
        assert!(matches!(err, OrderError::Persistence(StoreError::Backend(_))));
    }
}
