use crate::store::StoreError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Persistence failure: {0}")]
    Persistence(#[source] StoreError),

    #[error("{failed} order patch(es) failed during reconciliation")]
    PartialFailure { failed: usize },
}

impl OrderError {
    /// Stable machine-readable kind for API responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::MissingFields(_) | OrderError::Validation(_) => "validation",
            OrderError::NotFound(_) => "not_found",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::Persistence(_) => "persistence",
            OrderError::PartialFailure { .. } => "partial_failure",
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == "validation"
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => OrderError::NotFound(id),
            other => OrderError::Persistence(other),
        }
    }
}
