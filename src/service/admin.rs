use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::order::{OrderError, ReconciliationJob, ReconciliationScope, ReconciliationSummary};
use crate::metrics::OrderMetrics;
use crate::store::OrderStore;
use super::{respond, ApiResponse, RequestContext};

/// Administrative order operations.
///
/// Kept apart from `OrderService` so storefront code paths cannot reach a
/// bulk reassignment. Every call needs an identified operator and an
/// explicit scope.
pub struct AdminOrderService {
    reconciliation: ReconciliationJob,
}

impl AdminOrderService {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<OrderMetrics>) -> Self {
        Self {
            reconciliation: ReconciliationJob::new(store, metrics),
        }
    }

    pub async fn reassign_seller(
        &self,
        ctx: &RequestContext,
        seller_id: &str,
        scope: ReconciliationScope,
        cancel: &CancellationToken,
    ) -> ApiResponse<ReconciliationSummary> {
        let result = async {
            let operator = ctx
                .actor_id
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    OrderError::Validation("administrative calls require an operator id".to_string())
                })?;

            if scope == ReconciliationScope::All {
                tracing::warn!(
                    operator = %operator,
                    seller_id = %seller_id,
                    correlation_id = %ctx.correlation_id,
                    "⚠️ Blanket seller reassignment requested; every order will be moved"
                );
            }

            let summary = self
                .reconciliation
                .reassign_seller(seller_id, &scope, cancel)
                .await?;

            if let Some(partial) = summary.partial_failure() {
                tracing::warn!(
                    operator = %operator,
                    correlation_id = %ctx.correlation_id,
                    error = %partial,
                    "Reconciliation finished with failures"
                );
            }

            Ok(summary)
        }
        .await;

        respond(ctx, "reassign_seller", result)
    }
}
