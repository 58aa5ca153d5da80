use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::metrics::OrderMetrics;
use crate::store::{OrderStore, UnreadableDocument};
use super::errors::OrderError;
use super::value_objects::Order;

// ============================================================================
// Seller Attribution
// ============================================================================
//
// An order belongs to a seller when, checked in this order:
// 1. order.sellerId == seller
// 2. seller ∈ order.sellerIds
// 3. some item.sellerId == seller
//
// The first hit wins. Listing always scans the whole collection: none of the
// backends can query nested item fields, and dropping strategy 3 would hide
// every legacy order that only carries per-item attribution.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionMatch {
    PrimarySeller,
    SellerSet,
    ItemSeller,
}

impl AttributionMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionMatch::PrimarySeller => "seller_id",
            AttributionMatch::SellerSet => "seller_ids",
            AttributionMatch::ItemSeller => "item_seller_id",
        }
    }
}

/// Which strategy, if any, attributes `order` to `seller_id`.
pub fn match_seller(order: &Order, seller_id: &str) -> Option<AttributionMatch> {
    if order.seller_id.as_deref() == Some(seller_id) {
        return Some(AttributionMatch::PrimarySeller);
    }

    if order
        .seller_ids
        .as_ref()
        .is_some_and(|refs| refs.contains(seller_id))
    {
        return Some(AttributionMatch::SellerSet);
    }

    if order
        .items
        .iter()
        .any(|item| item.seller_id.as_deref() == Some(seller_id))
    {
        return Some(AttributionMatch::ItemSeller);
    }

    None
}

pub fn belongs_to_seller(order: &Order, seller_id: &str) -> bool {
    match_seller(order, seller_id).is_some()
}

/// Orders attributed to one seller, plus stored documents that could not be
/// read and so could not be checked.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrders {
    pub orders: Vec<Order>,
    pub unreadable: Vec<UnreadableDocument>,
}

pub struct SellerAttributionResolver {
    store: Arc<dyn OrderStore>,
    metrics: Arc<OrderMetrics>,
}

impl SellerAttributionResolver {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<OrderMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Every order attributed to `seller_id`, each exactly once.
    pub async fn list_for_seller(&self, seller_id: &str) -> Result<SellerOrders, OrderError> {
        if seller_id.trim().is_empty() {
            return Err(OrderError::Validation("seller id is required".to_string()));
        }

        let scan = self.store.scan().await?;
        let scanned = scan.total();

        let mut seen = HashSet::new();
        let mut matched = Vec::new();

        for order in scan.orders {
            let Some(strategy) = match_seller(&order, seller_id) else {
                continue;
            };
            if !seen.insert(order.id.clone()) {
                continue;
            }

            tracing::debug!(
                order_id = %order.id,
                seller_id = %seller_id,
                strategy = strategy.as_str(),
                "Order attributed to seller"
            );
            self.metrics.record_attribution_match(strategy.as_str());
            matched.push(order);
        }

        if !scan.unreadable.is_empty() {
            self.metrics.record_unreadable_documents("list_for_seller", scan.unreadable.len());
            tracing::warn!(
                seller_id = %seller_id,
                unreadable = scan.unreadable.len(),
                "Seller listing may be incomplete"
            );
        }

        tracing::info!(
            seller_id = %seller_id,
            scanned = scanned,
            matched = matched.len(),
            "Listed seller orders"
        );

        Ok(SellerOrders {
            orders: matched,
            unreadable: scan.unreadable,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
