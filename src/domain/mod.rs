// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Order rules live here, independent of any particular store backend.
// Components receive an `Arc<dyn OrderStore>` and an `Arc<OrderMetrics>`
// at construction.
//
// ============================================================================

pub mod order;
