// ============================================================================
// Order Store - persistence abstraction over a flat keyed document collection
// ============================================================================
//
// The store knows nothing about seller attribution. Attribution can live in
// three places (top-level field, set field, per-item field) and no backend
// here can query nested arrays, so seller-aware reads always go through
// `scan` and filter in-process. A scan never drops a document silently:
// records that cannot be decoded come back as `UnreadableDocument`s.
//
// Implementations:
// - InMemoryOrderStore: tests/dev
// - ScyllaOrderStore: JSON documents in a ScyllaDB table
// - TimedOrderStore: decorator bounding every call with a timeout + metrics
//
// ============================================================================

mod in_memory;
mod scylla_store;
mod timed;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::domain::order::{Order, OrderPatch};
use crate::utils::IsTransient;

pub use in_memory::InMemoryOrderStore;
pub use scylla_store::ScyllaOrderStore;
pub use timed::TimedOrderStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Version conflict on order {id}: expected {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },

    #[error("Store call '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    #[error("Corrupt order document {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict { .. } => "conflict",
            StoreError::Timeout { .. } => "timeout",
            StoreError::Corrupt { .. } => "corrupt",
            StoreError::Backend(_) => "backend",
        }
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Timeout { .. } | StoreError::Backend(_)
        )
    }
}

/// Fields `query_by_field` can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    UserId,
    SellerId,
    Status,
}

impl QueryField {
    pub fn name(&self) -> &'static str {
        match self {
            QueryField::UserId => "userId",
            QueryField::SellerId => "sellerId",
            QueryField::Status => "status",
        }
    }

    /// Equality on the top-level field only.
    pub fn matches(&self, order: &Order, value: &str) -> bool {
        match self {
            QueryField::UserId => order.user_id == value,
            QueryField::SellerId => order.seller_id.as_deref() == Some(value),
            QueryField::Status => order.status.map(|s| s.as_str()) == Some(value),
        }
    }
}

/// A stored record that could not be decoded into an `Order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadableDocument {
    pub id: String,
    pub reason: String,
}

impl UnreadableDocument {
    fn from_error(id: &str, error: &StoreError) -> Self {
        let reason = match error {
            StoreError::Corrupt { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        Self {
            id: id.to_string(),
            reason,
        }
    }
}

/// Result of a full collection read.
#[derive(Debug, Clone, Default)]
pub struct OrderScan {
    pub orders: Vec<Order>,
    pub unreadable: Vec<UnreadableDocument>,
}

impl OrderScan {
    /// Sort one stored document into `orders` or `unreadable`.
    pub(crate) fn push_document(&mut self, id: &str, document: Value) {
        match decode_document(id, document) {
            Ok(order) => self.orders.push(order),
            Err(e) => self.push_unreadable(id, &e),
        }
    }

    pub(crate) fn push_unreadable(&mut self, id: &str, error: &StoreError) {
        tracing::warn!(order_id = %id, error = %error, "Order document could not be decoded");
        self.unreadable.push(UnreadableDocument::from_error(id, error));
    }

    pub fn total(&self) -> usize {
        self.orders.len() + self.unreadable.len()
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fresh unique key for a new record.
    fn generate_id(&self) -> String;

    /// Persist a full record, overwriting whatever is stored at `order.id`.
    async fn put(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError>;

    /// Never fails on an empty collection or index; returns an empty list.
    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError>;

    /// Every record, each with its store key attached as `id`, plus the
    /// keys of documents that failed to decode.
    async fn scan(&self) -> Result<OrderScan, StoreError>;

    /// Every decodable record. Use `scan` when unreadable ones matter.
    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.scan().await?.orders)
    }

    /// Merge `patch` into the stored record and return the result.
    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError>;
}

/// Decode a stored document, attaching the store key as the order id.
pub(crate) fn decode_document(id: &str, document: Value) -> Result<Order, StoreError> {
    let mut order = Order::from_document(document).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    order.id = id.to_string();
    Ok(order)
}

pub(crate) fn encode_document(order: &Order) -> Result<Value, StoreError> {
    serde_json::to_value(order).map_err(|e| StoreError::Corrupt {
        id: order.id.clone(),
        reason: e.to_string(),
    })
}

pub(crate) fn check_version(id: &str, patch: &OrderPatch, current: u64) -> Result<(), StoreError> {
    match patch.expected_version {
        Some(expected) if expected != current => Err(StoreError::Conflict {
            id: id.to_string(),
            expected,
            actual: current,
        }),
        _ => Ok(()),
    }
}

/// Rounds of re-read and re-merge before a lost race becomes a Conflict.
pub(crate) const MERGE_ATTEMPTS: u32 = 5;

/// Optimistic read-merge-write for backends without a store-side merge.
///
/// `read` loads the current record; `write` persists the merged record only
/// if the stored version still equals the one read, answering whether it
/// did. A caller-supplied `expected_version` fails on the first lost race.
/// Without one the patch is re-applied to a fresh read, so a concurrent
/// write to other fields is never overwritten.
pub(crate) async fn merge_with_retry<R, RF, W, WF>(
    id: &str,
    patch: &OrderPatch,
    mut read: R,
    mut write: W,
) -> Result<Order, StoreError>
where
    R: FnMut() -> RF,
    RF: Future<Output = Result<Order, StoreError>>,
    W: FnMut(Order, u64) -> WF,
    WF: Future<Output = Result<bool, StoreError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let mut order = read().await?;
        let read_version = order.version;
        check_version(id, patch, read_version)?;
        patch.apply_to(&mut order, Utc::now());

        if write(order.clone(), read_version).await? {
            return Ok(order);
        }

        if patch.expected_version.is_some() || attempt >= MERGE_ATTEMPTS {
            let current = read().await?;
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: patch.expected_version.unwrap_or(read_version),
                actual: current.version,
            });
        }

        tracing::debug!(order_id = %id, attempt, "Concurrent write detected, re-merging patch");
    }
}
