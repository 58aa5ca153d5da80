use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use scylla::client::session::Session;
use scylla::value::{CqlValue, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::order::{Order, OrderPatch};
use super::{decode_document, encode_document, merge_with_retry, OrderScan, OrderStore, QueryField, StoreError};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// Each order is one row: the full JSON document plus two columns pulled out
// of it:
// - user_id: backs the secondary index used by `query_by_field(UserId)`
// - version: compare-and-swap token for conditional updates (LWT)
//
// Partial updates are read-merge-write on the document, always written as a
// lightweight transaction conditioned on the version that was read. A lost
// race is re-read and re-merged, so only the patched fields are last-writer
// -wins; a caller-supplied expected version turns the first lost race into
// a Conflict instead.
//
// ============================================================================

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS orders (
    id text PRIMARY KEY,
    user_id text,
    version bigint,
    document text
)";

const CREATE_USER_INDEX: &str = "CREATE INDEX IF NOT EXISTS orders_user_id_idx ON orders (user_id)";

const INSERT_ORDER: &str =
    "INSERT INTO orders (id, user_id, version, document) VALUES (?, ?, ?, ?)";

const SELECT_BY_ID: &str = "SELECT document FROM orders WHERE id = ?";

const SELECT_BY_USER: &str = "SELECT id, document FROM orders WHERE user_id = ?";

const SELECT_ALL: &str = "SELECT id, document FROM orders";

const UPDATE_ORDER_IF_VERSION: &str =
    "UPDATE orders SET user_id = ?, version = ?, document = ? WHERE id = ? IF version = ?";

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_document(id: &str, document: &str) -> Result<Order, StoreError> {
    let value: Value = serde_json::from_str(document).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    decode_document(id, value)
}

fn render_document(order: &Order) -> Result<String, StoreError> {
    Ok(encode_document(order)?.to_string())
}

/// First column of an LWT result row is `[applied]`.
fn lwt_applied(row: Option<Row>) -> bool {
    row.and_then(|row| row.columns.into_iter().next().flatten())
        .map(|value| matches!(value, CqlValue::Boolean(true)))
        .unwrap_or(false)
}

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    /// The session must already be bound to a keyspace.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.session.query_unpaged(CREATE_TABLE, ()).await?;
        self.session.query_unpaged(CREATE_USER_INDEX, ()).await?;

        tracing::info!("Order table and user index ready");
        Ok(())
    }

    async fn collect_rows(&self, statement: &'static str, user_id: Option<&str>) -> Result<OrderScan, StoreError> {
        let pager = match user_id {
            Some(user_id) => self.session.query_iter(statement, (user_id,)).await,
            None => self.session.query_iter(statement, ()).await,
        }
        .map_err(backend)?;

        let mut rows = pager.rows_stream::<(String, String)>().map_err(backend)?;
        let mut scan = OrderScan::default();

        while let Some((id, document)) = rows.try_next().await.map_err(backend)? {
            match parse_document(&id, &document) {
                Ok(order) => scan.orders.push(order),
                Err(e) => scan.push_unreadable(&id, &e),
            }
        }

        Ok(scan)
    }

    /// Conditional write; `false` when another writer got there first.
    async fn write_if_version(&self, order: &Order, read_version: u64) -> Result<bool, StoreError> {
        let document = render_document(order)?;

        let result = self
            .session
            .query_unpaged(
                UPDATE_ORDER_IF_VERSION,
                (&order.user_id, order.version as i64, document, &order.id, read_version as i64),
            )
            .await
            .map_err(backend)?;

        let row = result
            .into_rows_result()
            .map_err(backend)?
            .maybe_first_row::<Row>()
            .map_err(backend)?;

        Ok(lwt_applied(row))
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let document = render_document(order)?;

        self.session
            .query_unpaged(
                INSERT_ORDER,
                (&order.id, &order.user_id, order.version as i64, document),
            )
            .await
            .map_err(backend)?;

        tracing::debug!(order_id = %order.id, "Order document written");
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(SELECT_BY_ID, (id,))
            .await
            .map_err(backend)?;

        let row = result
            .into_rows_result()
            .map_err(backend)?
            .maybe_first_row::<(String,)>()
            .map_err(backend)?;

        match row {
            Some((document,)) => parse_document(id, &document),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError> {
        match field {
            QueryField::UserId => Ok(self.collect_rows(SELECT_BY_USER, Some(value)).await?.orders),
            // Only user_id is indexed; other fields fall back to a scan.
            other => Ok(self
                .collect_rows(SELECT_ALL, None)
                .await?
                .orders
                .into_iter()
                .filter(|order| other.matches(order, value))
                .collect()),
        }
    }

    async fn scan(&self) -> Result<OrderScan, StoreError> {
        self.collect_rows(SELECT_ALL, None).await
    }

    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError> {
        let order = merge_with_retry(
            id,
            patch,
            move || self.get_by_id(id),
            move |merged: Order, read_version: u64| async move {
                self.write_if_version(&merged, read_version).await
            },
        )
        .await?;

        tracing::debug!(
            order_id = %id,
            version = order.version,
            fields = ?patch.changed_fields(),
            "Order document patched"
        );

        Ok(order)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Database round trips need a live ScyllaDB node; these cover the document
// and LWT handling that does not.
//
// ============================================================================
