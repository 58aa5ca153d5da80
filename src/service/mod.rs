// ============================================================================
// Service Layer - interfaces exposed to storefront collaborators
// ============================================================================
//
// - OrderService: customer and seller facing calls
// - AdminOrderService: data-repair tooling (reconciliation)
//
// Every call takes an explicit RequestContext and answers with an
// ApiResponse; failures never escape as Err to the caller.
//
// ============================================================================

mod admin;
mod orders;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::OrderError;

pub use admin::AdminOrderService;
pub use orders::{CreatedOrder, OrderService};

/// Caller identity and correlation for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub correlation_id: Uuid,
}

impl RequestContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            actor_id: None,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn actor(&self) -> &str {
        self.actor_id.as_deref().unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiError {
    pub kind: &'static str,
    pub message: String,
}

impl From<&OrderError> for ApiError {
    fn from(err: &OrderError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// `{success, data?, error?}` as consumed by the storefront UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    /// Non-fatal problems, e.g. stored records a listing could not read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure(err: &OrderError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl<T> From<Result<T, OrderError>> for ApiResponse<T> {
    fn from(result: Result<T, OrderError>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(err) => ApiResponse::failure(&err),
        }
    }
}

/// Log a failed call with its context, then convert.
pub(crate) fn respond<T>(
    ctx: &RequestContext,
    operation: &'static str,
    result: Result<T, OrderError>,
) -> ApiResponse<T> {
    if let Err(e) = &result {
        tracing::warn!(
            operation,
            correlation_id = %ctx.correlation_id,
            actor = %ctx.actor(),
            kind = e.kind(),
            error = %e,
            "Order request failed"
        );
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response_shape() {
        let response = ApiResponse::ok(vec![1, 2]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "success": true, "data": [1, 2] })
        );
    }

    #[test]
    fn test_failure_response_shape() {
        let response: ApiResponse<()> =
            Err(OrderError::NotFound("o1".to_string())).into();

        assert!(!response.success);
        assert_eq!(response.error_kind(), Some("not_found"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": false,
                "error": { "kind": "not_found", "message": "Order not found: o1" }
            })
        );
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RequestContext::anonymous();
        assert_eq!(ctx.actor(), "anonymous");
        assert_eq!(RequestContext::new("ops-1").actor(), "ops-1");
    }
}
