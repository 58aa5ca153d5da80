use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::metrics::OrderMetrics;
use crate::store::OrderStore;
use super::errors::OrderError;
use super::value_objects::{Order, OrderPatch, OrderStatus};

// ============================================================================
// Order Status Machine
// ============================================================================
//
// The storefront has always allowed any status to move to any other
// (delivered → pending included). That stays the default. Whether it was
// intended is an open product question, so the check is a pluggable policy
// rather than a hard-coded graph.
//
// Non-permissive policies read the current status and write with its
// version as a compare-and-swap token, so the check and the write cannot be
// split by a concurrent update.
//
// ============================================================================

pub trait TransitionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether `check` needs the stored status (costs one read).
    fn requires_current_status(&self) -> bool {
        true
    }

    fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError>;
}

/// Any status to any status.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

impl TransitionPolicy for Permissive {
    fn name(&self) -> &'static str {
        "permissive"
    }

    fn requires_current_status(&self) -> bool {
        false
    }

    fn check(&self, _from: OrderStatus, _to: OrderStatus) -> Result<(), OrderError> {
        Ok(())
    }
}

/// Table-driven guard. Re-applying the current status is always allowed.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    name: &'static str,
    allowed: HashMap<OrderStatus, HashSet<OrderStatus>>,
}

impl TransitionTable {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            allowed: HashMap::new(),
        }
    }

    pub fn allow(mut self, from: OrderStatus, to: &[OrderStatus]) -> Self {
        self.allowed.entry(from).or_default().extend(to.iter().copied());
        self
    }

    /// pending → processing → shipped → delivered; cancellation from any
    /// non-terminal state. Delivered and cancelled are terminal.
    pub fn forward_only() -> Self {
        use OrderStatus::*;

        Self::new("forward-only")
            .allow(Pending, &[Processing, Shipped, Delivered, Cancelled])
            .allow(Processing, &[Shipped, Delivered, Cancelled])
            .allow(Shipped, &[Delivered, Cancelled])
    }

    pub fn is_allowed(&self, from: OrderStatus, to: OrderStatus) -> bool {
        from == to || self.allowed.get(&from).is_some_and(|targets| targets.contains(&to))
    }
}

impl TransitionPolicy for TransitionTable {
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.is_allowed(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition { from, to })
        }
    }
}

pub struct OrderStatusMachine {
    store: Arc<dyn OrderStore>,
    policy: Arc<dyn TransitionPolicy>,
    metrics: Arc<OrderMetrics>,
}

impl OrderStatusMachine {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<OrderMetrics>) -> Self {
        Self::with_policy(store, Arc::new(Permissive), metrics)
    }

    pub fn with_policy(
        store: Arc<dyn OrderStore>,
        policy: Arc<dyn TransitionPolicy>,
        metrics: Arc<OrderMetrics>,
    ) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub async fn set_status(&self, order_id: &str, new_status: OrderStatus) -> Result<Order, OrderError> {
        if order_id.trim().is_empty() {
            return Err(OrderError::Validation("order id is required".to_string()));
        }

        let result = self.apply(order_id, new_status).await;

        match &result {
            Ok(order) => {
                self.metrics.record_status_update(new_status, "applied");
                tracing::info!(
                    order_id = %order_id,
                    status = %new_status,
                    version = order.version,
                    policy = self.policy.name(),
                    "Order status updated"
                );
            }
            Err(e) => {
                self.metrics.record_status_update(new_status, e.kind());
                tracing::warn!(
                    order_id = %order_id,
                    status = %new_status,
                    policy = self.policy.name(),
                    error = %e,
                    "Order status update rejected"
                );
            }
        }

        result
    }

    pub async fn cancel(&self, order_id: &str) -> Result<Order, OrderError> {
        self.set_status(order_id, OrderStatus::Cancelled).await
    }

    async fn apply(&self, order_id: &str, new_status: OrderStatus) -> Result<Order, OrderError> {
        let mut patch = OrderPatch::status(new_status);

        if self.policy.requires_current_status() {
            let current = self.store.get_by_id(order_id).await?;
            // Legacy records without a status are treated as pending.
            let from = current.status.unwrap_or(OrderStatus::Pending);
            self.policy.check(from, new_status)?;
            patch = patch.with_expected_version(current.version);
        }

        Ok(self.store.update_partial(order_id, &patch).await?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
