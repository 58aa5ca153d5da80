// ============================================================================
// storefront_orders - order persistence and seller attribution
// ============================================================================
//
// - store:   OrderStore contract, in-memory, ScyllaDB and timed backends
// - domain:  factory, attribution resolver, status machine, reconciliation
// - service: OrderService / AdminOrderService request interfaces
// - metrics: Prometheus registry and HTTP exporter
// - config:  environment-driven AppConfig
// - utils:   retry with backoff
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod metrics;
pub mod service;
pub mod store;
pub mod utils;
