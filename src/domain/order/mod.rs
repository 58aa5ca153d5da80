// ============================================================================
// Order Domain - persistence rules and seller attribution
// ============================================================================
//
// - Value objects (Order, OrderItem, OrderStatus, NewOrder, OrderPatch)
// - Errors (OrderError)
// - OrderFactory: validated creation
// - SellerAttributionResolver: "does this order belong to this seller"
// - OrderStatusMachine: status writes behind a pluggable transition policy
// - ReconciliationJob: bulk repair of seller attribution fields
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod factory;
pub mod attribution;
pub mod status;
pub mod reconciliation;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use factory::*;
pub use attribution::*;
pub use status::*;
pub use reconciliation::*;
