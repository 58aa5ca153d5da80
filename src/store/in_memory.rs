use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::order::{Order, OrderPatch};
use super::{check_version, decode_document, encode_document, OrderScan, OrderStore, QueryField, StoreError};

/// In-memory document collection.
///
/// Records are kept as raw JSON so tests can seed legacy-shaped documents
/// with `insert_raw`. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document verbatim, bypassing any shape checks.
    pub fn insert_raw(&self, id: impl Into<String>, document: Value) -> Result<(), StoreError> {
        self.write()?.insert(id.into(), document);
        Ok(())
    }

    /// Raw stored document, as another client would see it.
    pub fn raw(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>>, StoreError> {
        self.documents
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Value>>, StoreError> {
        self.documents
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn decode_all(&self) -> Result<OrderScan, StoreError> {
        let documents = self.read()?;
        let mut scan = OrderScan::default();

        for (id, document) in documents.iter() {
            scan.push_document(id, document.clone());
        }

        Ok(scan)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let document = encode_document(order)?;
        self.write()?.insert(order.id.clone(), document);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, StoreError> {
        let document = self
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        decode_document(id, document)
    }

    async fn query_by_field(&self, field: QueryField, value: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .decode_all()?
            .orders
            .into_iter()
            .filter(|order| field.matches(order, value))
            .collect())
    }

    async fn scan(&self) -> Result<OrderScan, StoreError> {
        self.decode_all()
    }

    async fn update_partial(&self, id: &str, patch: &OrderPatch) -> Result<Order, StoreError> {
        // Held across read-merge-write so single-key updates are atomic.
        let mut documents = self.write()?;

        let document = documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut order = decode_document(id, document)?;
        check_version(id, patch, order.version)?;
        patch.apply_to(&mut order, Utc::now());

        documents.insert(id.to_string(), encode_document(&order)?);
        Ok(order)
    }
}
