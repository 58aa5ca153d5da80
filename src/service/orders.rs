use std::sync::Arc;

use serde::Serialize;

use crate::domain::order::{
    NewOrder, Order, OrderError, OrderFactory, OrderStatus, OrderStatusMachine,
    SellerAttributionResolver, TransitionPolicy,
};
use crate::metrics::OrderMetrics;
use crate::store::{OrderStore, QueryField};
use super::{respond, ApiResponse, RequestContext};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: String,
}

/// Customer and seller facing order operations.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    factory: OrderFactory,
    resolver: SellerAttributionResolver,
    status: OrderStatusMachine,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        policy: Arc<dyn TransitionPolicy>,
        metrics: Arc<OrderMetrics>,
    ) -> Self {
        Self {
            factory: OrderFactory::new(store.clone(), metrics.clone()),
            resolver: SellerAttributionResolver::new(store.clone(), metrics.clone()),
            status: OrderStatusMachine::with_policy(store.clone(), policy, metrics),
            store,
        }
    }

    pub async fn create_order(&self, ctx: &RequestContext, input: NewOrder) -> ApiResponse<CreatedOrder> {
        tracing::debug!(correlation_id = %ctx.correlation_id, actor = %ctx.actor(), "create_order");

        let result = self
            .factory
            .create(input)
            .await
            .map(|order_id| CreatedOrder { order_id });

        respond(ctx, "create_order", result)
    }

    pub async fn get_order_by_id(&self, ctx: &RequestContext, order_id: &str) -> ApiResponse<Order> {
        let result = async {
            if order_id.trim().is_empty() {
                return Err(OrderError::Validation("order id is required".to_string()));
            }
            Ok(self.store.get_by_id(order_id).await?)
        }
        .await;

        respond(ctx, "get_order_by_id", result)
    }

    /// Empty list, not an error, when the user has no orders.
    pub async fn get_user_orders(&self, ctx: &RequestContext, user_id: &str) -> ApiResponse<Vec<Order>> {
        let result = async {
            if user_id.trim().is_empty() {
                return Err(OrderError::Validation("user id is required".to_string()));
            }
            let orders = self.store.query_by_field(QueryField::UserId, user_id).await?;
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                user_id = %user_id,
                count = orders.len(),
                "Loaded user orders"
            );
            Ok(orders)
        }
        .await;

        respond(ctx, "get_user_orders", result)
    }

    /// Orders that could not be read are named in `warnings`.
    pub async fn get_seller_orders(&self, ctx: &RequestContext, seller_id: &str) -> ApiResponse<Vec<Order>> {
        match self.resolver.list_for_seller(seller_id).await {
            Ok(listing) => {
                let warnings = listing
                    .unreadable
                    .iter()
                    .map(|doc| format!("order {} could not be read: {}", doc.id, doc.reason))
                    .collect();
                respond(ctx, "get_seller_orders", Ok(listing.orders)).with_warnings(warnings)
            }
            Err(e) => respond(ctx, "get_seller_orders", Err(e)),
        }
    }

    pub async fn update_order_status(
        &self,
        ctx: &RequestContext,
        order_id: &str,
        status: OrderStatus,
    ) -> ApiResponse<Order> {
        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            actor = %ctx.actor(),
            order_id = %order_id,
            status = %status,
            "update_order_status"
        );

        let result = self.status.set_status(order_id, status).await;
        respond(ctx, "update_order_status", result)
    }

    pub async fn cancel_order(&self, ctx: &RequestContext, order_id: &str) -> ApiResponse<Order> {
        let result = self.status.cancel(order_id).await;
        respond(ctx, "cancel_order", result)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
