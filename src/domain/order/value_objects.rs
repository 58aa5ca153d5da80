use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================
//
// Orders live in the store as loosely-shaped JSON documents written by
// several generations of the storefront. Reads are lenient (legacy fields may
// be absent or malformed); creation input is validated by the OrderFactory.
//
// Unknown top-level and item fields are carried through untouched. So is a
// status outside the known set, and numbers written as strings are read as
// numbers.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrderError::Validation(format!("unknown order status: {s}")))
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|_| de::Error::custom(format!("unknown order status: {raw}")))
    }
}

/// Known statuses in any case; anything else reads as `None`.
fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OrderStatus>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok()))
}

/// Numbers, numeric strings and null (as zero).
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Loose::Number(n)) => Ok(n),
        Some(Loose::Text(text)) if text.trim().is_empty() => Ok(0.0),
        Some(Loose::Text(text)) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("not a number: {text:?}"))),
    }
}

/// Whole values are written back as integers, as older clients stored them.
fn whole_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// The `sellerIds` field as found in the store.
///
/// Older records sometimes hold a bare string or a mixed array here, so
/// anything that is not a list of strings is kept verbatim as `Malformed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SellerRefs {
    Set(Vec<String>),
    Malformed(Value),
}

impl SellerRefs {
    pub fn single(seller_id: impl Into<String>) -> Self {
        SellerRefs::Set(vec![seller_id.into()])
    }

    /// Membership only counts for a proper set.
    pub fn contains(&self, seller_id: &str) -> bool {
        match self {
            SellerRefs::Set(ids) => ids.iter().any(|id| id == seller_id),
            SellerRefs::Malformed(_) => false,
        }
    }

    pub fn is_proper_set(&self) -> bool {
        matches!(self, SellerRefs::Set(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            SellerRefs::Set(ids) => ids.iter().all(|id| id.is_empty()),
            SellerRefs::Malformed(value) => value.is_null(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default, alias = "productId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number", serialize_with = "whole_number")]
    pub price: f64,
    /// Legacy records hold fractional and negative quantities too.
    #[serde(default, deserialize_with = "lenient_number", serialize_with = "whole_number")]
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderItem {
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Store key. Documents written by older clients may omit it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_ids: Option<SellerRefs>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default, deserialize_with = "lenient_number", serialize_with = "whole_number")]
    pub total_amount: f64,
    /// `None` when absent or not a known status; see `unrecognised_status`.
    #[serde(default, deserialize_with = "lenient_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every partial update.
    #[serde(default)]
    pub version: u64,
    /// Customer, shipping, billing and payment data.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Order {
    /// Decode a stored document. A `status` that is not a known status is
    /// parked in `details` so a write-back keeps it verbatim.
    pub fn from_document(document: Value) -> serde_json::Result<Self> {
        let raw_status = document.get("status").filter(|v| !v.is_null()).cloned();
        let mut order: Order = serde_json::from_value(document)?;

        if order.status.is_none() {
            if let Some(raw) = raw_status {
                order.details.insert("status".to_string(), raw);
            }
        }

        Ok(order)
    }

    /// Stored status value outside the known set, if any.
    pub fn unrecognised_status(&self) -> Option<&Value> {
        self.details.get("status")
    }

    /// True when no seller reference exists at any of the three levels.
    pub fn is_unattributed(&self) -> bool {
        let no_primary = self.seller_id.as_deref().map_or(true, str::is_empty);
        let no_set = self.seller_ids.as_ref().map_or(true, SellerRefs::is_empty);
        let no_items = self
            .items
            .iter()
            .all(|item| item.seller_id.as_deref().map_or(true, str::is_empty));

        no_primary && no_set && no_items
    }

    pub fn items_subtotal(&self) -> f64 {
        self.items.iter().map(OrderItem::subtotal).sum()
    }
}

/// Creation input accepted by the OrderFactory.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub seller_ids: Option<Vec<String>>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl NewOrder {
    /// Required fields that are absent or falsy (blank id, no items, zero total).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.user_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            missing.push("userId");
        }
        if self.items.is_empty() {
            missing.push("items");
        }
        match self.total_amount {
            Some(total) if total != 0.0 && !total.is_nan() => {}
            _ => missing.push("totalAmount"),
        }

        missing
    }
}

/// Top-level fields merged into a stored order by `update_partial`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub seller_id: Option<String>,
    pub seller_ids: Option<Vec<String>>,
    pub items: Option<Vec<OrderItem>>,
    /// Compare-and-swap token. `None` means last writer wins.
    pub expected_version: Option<u64>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.seller_id.is_some() {
            fields.push("sellerId");
        }
        if self.seller_ids.is_some() {
            fields.push("sellerIds");
        }
        if self.items.is_some() {
            fields.push("items");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        fields
    }

    /// Merge into `order`, bumping its version and update stamp.
    pub fn apply_to(&self, order: &mut Order, at: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = Some(status);
            order.details.remove("status");
        }
        if let Some(seller_id) = &self.seller_id {
            order.seller_id = Some(seller_id.clone());
        }
        if let Some(seller_ids) = &self.seller_ids {
            order.seller_ids = Some(SellerRefs::Set(seller_ids.clone()));
        }
        if let Some(items) = &self.items {
            order.items = items.clone();
        }
        order.version += 1;
        order.updated_at = Some(at);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
