use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::metrics::OrderMetrics;
use crate::store::OrderStore;
use super::attribution::belongs_to_seller;
use super::errors::OrderError;
use super::value_objects::{Order, OrderPatch, OrderStatus};

// ============================================================================
// Reconciliation Job - seller attribution repair
// ============================================================================
//
// For each order in scope, brings all three attribution signals onto one
// seller:
// - sellerId        → seller, if absent or different
// - sellerIds       → [seller], if absent, malformed or missing the seller
// - item.sellerId   → seller, if absent or different (rest of item kept)
// - status          → pending, if absent (an unrecognised value is kept)
//
// One update_partial per changed order with only the changed fields. A
// failed patch is recorded and skipped; there are no retries. Documents the
// store cannot decode are never repaired and are reported as failures. The sweep is
// not transactional: other writers may interleave and each patch is visible
// as soon as it lands.
//
// With ReconciliationScope::All this reassigns EVERY order, including other
// sellers' orders. That is only meant for maintenance and test fixtures.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationScope {
    /// Every order in the collection.
    All,
    /// Orders with no seller reference at any level.
    Unattributed,
    /// Orders the resolver already attributes to this seller. The target
    /// seller must be the same one.
    AttributedTo(String),
}

impl ReconciliationScope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            ReconciliationScope::All => true,
            ReconciliationScope::Unattributed => order.is_unattributed(),
            ReconciliationScope::AttributedTo(seller_id) => belongs_to_seller(order, seller_id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationScope::All => "all",
            ReconciliationScope::Unattributed => "unattributed",
            ReconciliationScope::AttributedTo(_) => "attributed_to",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatchFailure {
    pub order_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    pub success: bool,
    pub message: String,
    pub fixed_count: usize,
    pub scanned_count: usize,
    pub out_of_scope_count: usize,
    pub unreadable_count: usize,
    pub failures: Vec<PatchFailure>,
    pub cancelled: bool,
}

impl ReconciliationSummary {
    /// `Some(PartialFailure)` when at least one patch failed.
    pub fn partial_failure(&self) -> Option<OrderError> {
        (!self.failures.is_empty()).then(|| OrderError::PartialFailure {
            failed: self.failures.len(),
        })
    }
}

/// Patch needed to put `order` fully on `seller_id`; empty when none.
pub fn plan_repair(order: &Order, seller_id: &str) -> OrderPatch {
    let mut patch = OrderPatch::default();

    if order.seller_id.as_deref() != Some(seller_id) {
        patch.seller_id = Some(seller_id.to_string());
    }

    let set_ok = order
        .seller_ids
        .as_ref()
        .is_some_and(|refs| refs.is_proper_set() && refs.contains(seller_id));
    if !set_ok {
        patch.seller_ids = Some(vec![seller_id.to_string()]);
    }

    if order
        .items
        .iter()
        .any(|item| item.seller_id.as_deref() != Some(seller_id))
    {
        patch.items = Some(
            order
                .items
                .iter()
                .cloned()
                .map(|mut item| {
                    item.seller_id = Some(seller_id.to_string());
                    item
                })
                .collect(),
        );
    }

    if order.status.is_none() && order.unrecognised_status().is_none() {
        patch.status = Some(OrderStatus::Pending);
    }

    patch
}

pub struct ReconciliationJob {
    store: Arc<dyn OrderStore>,
    metrics: Arc<OrderMetrics>,
}

impl ReconciliationJob {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<OrderMetrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn reassign_seller(
        &self,
        seller_id: &str,
        scope: &ReconciliationScope,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationSummary, OrderError> {
        if seller_id.trim().is_empty() {
            return Err(OrderError::Validation("target seller id is required".to_string()));
        }

        if let ReconciliationScope::AttributedTo(scoped) = scope {
            if scoped != seller_id {
                return Err(OrderError::Validation(format!(
                    "scope is limited to seller {scoped} but the target is {seller_id}; \
                     moving orders between sellers needs the All scope"
                )));
            }
        }

        tracing::info!(seller_id = %seller_id, scope = scope.label(), "🔧 Starting seller reconciliation");

        let scan = match self.store.scan().await {
            Ok(scan) => scan,
            Err(e) => {
                tracing::error!(seller_id = %seller_id, error = %e, "Reconciliation scan failed");
                self.metrics.record_reconciliation(scope.label(), 0, 0, "scan_failed");
                return Err(e.into());
            }
        };

        let total = scan.total();
        let unreadable_count = scan.unreadable.len();
        let mut fixed_count = 0;
        let mut out_of_scope_count = 0;
        let mut scanned_count = 0;
        let mut failures: Vec<PatchFailure> = scan
            .unreadable
            .into_iter()
            .map(|doc| PatchFailure {
                order_id: doc.id,
                error: format!("unreadable document: {}", doc.reason),
            })
            .collect();
        let mut cancelled = false;

        for order in &scan.orders {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(seller_id = %seller_id, scanned = scanned_count, "Reconciliation cancelled");
                break;
            }
            scanned_count += 1;

            if !scope.includes(order) {
                out_of_scope_count += 1;
                continue;
            }

            let patch = plan_repair(order, seller_id);
            if patch.is_empty() {
                continue;
            }

            match self.store.update_partial(&order.id, &patch).await {
                Ok(_) => {
                    fixed_count += 1;
                    tracing::debug!(
                        order_id = %order.id,
                        fields = ?patch.changed_fields(),
                        "Order attribution repaired"
                    );
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Skipping order, patch failed");
                    failures.push(PatchFailure {
                        order_id: order.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let outcome = match (cancelled, failures.is_empty()) {
            (true, _) => "cancelled",
            (false, false) => "partial_failure",
            (false, true) => "completed",
        };
        self.metrics
            .record_reconciliation(scope.label(), fixed_count, failures.len(), outcome);

        let mut message = format!("Reassigned {fixed_count} of {total} order(s) to seller {seller_id}");
        if unreadable_count > 0 {
            message.push_str(&format!("; {unreadable_count} document(s) could not be read"));
        }
        let failed_patches = failures.len() - unreadable_count;
        if failed_patches > 0 {
            message.push_str(&format!("; {failed_patches} patch(es) failed"));
        }
        if cancelled {
            message.push_str("; sweep cancelled before completion");
        }

        tracing::info!(
            seller_id = %seller_id,
            scope = scope.label(),
            fixed_count = fixed_count,
            failed_count = failures.len(),
            unreadable = unreadable_count,
            scanned = scanned_count,
            cancelled = cancelled,
            "Seller reconciliation finished"
        );

        Ok(ReconciliationSummary {
            success: true,
            message,
            fixed_count,
            scanned_count,
            out_of_scope_count,
            unreadable_count,
            failures,
            cancelled,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderItem, SellerRefs};
    use crate::store::testing::FlakyOrderStore;
    use crate::store::InMemoryOrderStore;
    use serde_json::json;

    fn metrics() -> Arc<OrderMetrics> {
        Arc::new(OrderMetrics::new().unwrap())
    }

    fn seed(store: &InMemoryOrderStore) {
        store
            .insert_raw("a", json!({
                "userId": "u1",
                "items": [{ "name": "Lamp", "price": 10, "quantity": 1 }],
                "totalAmount": 10
            }))
            .unwrap();
        store
            .insert_raw("b", json!({
                "userId": "u2",
                "sellerId": "other",
                "sellerIds": "other",
                "items": [{ "name": "Desk", "price": 99, "quantity": 1, "sellerId": "other", "sku": "D-1" }],
                "totalAmount": 99,
                "status": "shipped"
            }))
            .unwrap();
        store
            .insert_raw("c", json!({
                "userId": "u3",
                "sellerId": "s9",
                "sellerIds": ["s9"],
                "items": [{ "name": "Pen", "price": 2, "quantity": 3, "sellerId": "s9" }],
                "totalAmount": 6,
                "status": "pending"
            }))
            .unwrap();
    }

    #[test]
    fn test_plan_for_consistent_order_is_empty() {
        let order = Order {
            seller_id: Some("s1".to_string()),
            seller_ids: Some(SellerRefs::single("s1")),
            items: vec![OrderItem {
                seller_id: Some("s1".to_string()),
                ..OrderItem::default()
            }],
            status: Some(OrderStatus::Delivered),
            ..Order::default()
        };

        assert!(plan_repair(&order, "s1").is_empty());
    }

    #[test]
    fn test_plan_repairs_each_field_independently() {
        let order = Order {
            seller_id: Some("s1".to_string()),
            seller_ids: Some(SellerRefs::Malformed(json!(42))),
            items: vec![OrderItem {
                seller_id: Some("s1".to_string()),
                ..OrderItem::default()
            }],
            ..Order::default()
        };

        let patch = plan_repair(&order, "s1");
        assert_eq!(patch.changed_fields(), vec!["sellerIds", "status"]);
        assert_eq!(patch.seller_ids, Some(vec!["s1".to_string()]));
        assert_eq!(patch.status, Some(OrderStatus::Pending));
    }

    #[tokio::test]
    async fn test_blanket_reassignment_and_idempotence() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let job = ReconciliationJob::new(store.clone(), metrics());
        let token = CancellationToken::new();

        let first = job
            .reassign_seller("s9", &ReconciliationScope::All, &token)
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.fixed_count, 2);
        assert!(first.failures.is_empty());

        let second = job
            .reassign_seller("s9", &ReconciliationScope::All, &token)
            .await
            .unwrap();
        assert_eq!(second.fixed_count, 0);

        for order in store.get_all().await.unwrap() {
            assert_eq!(order.seller_id.as_deref(), Some("s9"));
            assert_eq!(order.seller_ids, Some(SellerRefs::single("s9")));
            assert!(order.items.iter().all(|i| i.seller_id.as_deref() == Some("s9")));
            assert!(order.status.is_some());
        }
    }

    #[tokio::test]
    async fn test_repair_preserves_item_identity_and_status() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let job = ReconciliationJob::new(store.clone(), metrics());

        job.reassign_seller("s9", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap();

        let raw = store.raw("b").unwrap().unwrap();
        assert_eq!(raw["items"][0]["sku"], json!("D-1"));
        assert_eq!(raw["items"][0]["name"], json!("Desk"));
        assert_eq!(raw["status"], json!("shipped"));
        assert_eq!(raw["totalAmount"], json!(99));
        assert_eq!(store.raw("a").unwrap().unwrap()["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_untouched_orders_are_not_written() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let flaky = Arc::new(FlakyOrderStore::new(store.clone()));
        let job = ReconciliationJob::new(flaky.clone(), metrics());

        job.reassign_seller("s9", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(flaky.patch_count(), 2);
        assert_eq!(store.get_by_id("c").await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_unattributed_scope_leaves_other_sellers_alone() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let job = ReconciliationJob::new(store.clone(), metrics());

        let summary = job
            .reassign_seller("s9", &ReconciliationScope::Unattributed, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.fixed_count, 1);
        assert_eq!(summary.out_of_scope_count, 2);
        assert_eq!(store.get_by_id("a").await.unwrap().seller_id.as_deref(), Some("s9"));
        assert_eq!(store.get_by_id("b").await.unwrap().seller_id.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_attributed_to_scope_repairs_only_that_sellers_orders() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        store
            .insert_raw("d", json!({
                "userId": "u4",
                "items": [{ "name": "Cup", "price": 4, "quantity": 1, "sellerId": "s5" }],
                "totalAmount": 4,
                "status": "pending"
            }))
            .unwrap();
        let job = ReconciliationJob::new(store.clone(), metrics());

        let summary = job
            .reassign_seller(
                "s5",
                &ReconciliationScope::AttributedTo("s5".to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.fixed_count, 1);
        let repaired = store.get_by_id("d").await.unwrap();
        assert_eq!(repaired.seller_id.as_deref(), Some("s5"));
        assert_eq!(repaired.seller_ids, Some(SellerRefs::single("s5")));
        assert_eq!(store.get_by_id("b").await.unwrap().seller_id.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_failed_patch_does_not_abort_sweep() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let flaky = Arc::new(FlakyOrderStore::new(store.clone()).failing_on("a"));
        let metrics = metrics();
        let job = ReconciliationJob::new(flaky, metrics.clone());

        let summary = job
            .reassign_seller("s9", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.fixed_count, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].order_id, "a");
        assert!(matches!(summary.partial_failure(), Some(OrderError::PartialFailure { failed: 1 })));
        assert_eq!(store.get_by_id("b").await.unwrap().seller_id.as_deref(), Some("s9"));
        assert_eq!(metrics.reconciliation_failed.get(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_patches_nothing() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let job = ReconciliationJob::new(store.clone(), metrics());
        let token = CancellationToken::new();
        token.cancel();

        let summary = job
            .reassign_seller("s9", &ReconciliationScope::All, &token)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.fixed_count, 0);
        assert_eq!(summary.scanned_count, 0);
        assert_eq!(store.get_by_id("a").await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_blank_target_is_rejected() {
        let job = ReconciliationJob::new(Arc::new(InMemoryOrderStore::new()), metrics());
        let err = job
            .reassign_seller("", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_attributed_scope_must_match_target() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        let job = ReconciliationJob::new(store.clone(), metrics());

        let err = job
            .reassign_seller(
                "s5",
                &ReconciliationScope::AttributedTo("s9".to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(store.get_by_id("c").await.unwrap().seller_id.as_deref(), Some("s9"));
        assert_eq!(store.get_by_id("c").await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_legacy_shaped_orders_are_repaired() {
        let store = Arc::new(InMemoryOrderStore::new());
        store
            .insert_raw("cap", json!({ "userId": "u1", "sellerId": "s1", "status": "Shipped", "items": [] }))
            .unwrap();
        store
            .insert_raw("price", json!({
                "userId": "u2",
                "items": [{ "name": "Lamp", "price": "10", "quantity": 1.5, "sellerId": "s1" }]
            }))
            .unwrap();
        store
            .insert_raw("hold", json!({ "userId": "u3", "status": "on_hold", "items": [] }))
            .unwrap();
        let job = ReconciliationJob::new(store.clone(), metrics());

        let summary = job
            .reassign_seller("s9", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.scanned_count, 3);
        assert_eq!(summary.fixed_count, 3);
        assert!(summary.failures.is_empty());

        let cap = store.raw("cap").unwrap().unwrap();
        assert_eq!(cap["sellerId"], json!("s9"));
        assert_eq!(cap["status"], json!("shipped"));

        let price = store.raw("price").unwrap().unwrap();
        assert_eq!(price["items"][0]["sellerId"], json!("s9"));
        assert_eq!(price["items"][0]["quantity"], json!(1.5));

        assert_eq!(store.raw("hold").unwrap().unwrap()["status"], json!("on_hold"));
    }

    #[tokio::test]
    async fn test_unreadable_documents_are_reported_as_failures() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store);
        store
            .insert_raw("broken", json!({ "userId": "u9", "items": [{ "price": "ten" }] }))
            .unwrap();
        let job = ReconciliationJob::new(store.clone(), metrics());

        let summary = job
            .reassign_seller("s9", &ReconciliationScope::All, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.fixed_count, 2);
        assert_eq!(summary.unreadable_count, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].order_id, "broken");
        assert!(summary.failures[0].error.starts_with("unreadable document"));
        assert!(summary.partial_failure().is_some());
        assert!(summary.message.contains("of 4 order(s)"));
        assert!(summary.message.contains("1 document(s) could not be read"));
    }
}
