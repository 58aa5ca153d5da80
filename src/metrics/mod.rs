// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

use crate::domain::order::OrderStatus;
use crate::store::StoreError;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order core
// ============================================================================
//
// One OrderMetrics instance is shared (Arc) by every component:
// - order creation and validation failures
// - seller attribution matches by strategy
// - status updates by target status and outcome
// - reconciliation runs, patches and failed patches
// - store call latency and errors
//
// Served via /metrics by the binary.
// ============================================================================

pub struct OrderMetrics {
    registry: Registry,

    // Creation
    pub orders_created: IntCounter,
    pub validation_failures: IntCounterVec,

    // Attribution
    pub attribution_matches: IntCounterVec,

    // Status machine
    pub status_updates: IntCounterVec,

    // Reconciliation
    pub reconciliation_runs: IntCounterVec,
    pub reconciliation_patched: IntCounter,
    pub reconciliation_failed: IntCounter,

    // Store
    pub store_call_duration: HistogramVec,
    pub store_errors: IntCounterVec,
}

impl OrderMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let validation_failures = IntCounterVec::new(
            Opts::new("order_validation_failures_total", "Order inputs rejected, by missing field"),
            &["field"],
        )?;
        registry.register(Box::new(validation_failures.clone()))?;

        let attribution_matches = IntCounterVec::new(
            Opts::new(
                "seller_attribution_matches_total",
                "Orders attributed to a seller, by the strategy that matched",
            ),
            &["strategy"],
        )?;
        registry.register(Box::new(attribution_matches.clone()))?;

        let status_updates = IntCounterVec::new(
            Opts::new("order_status_updates_total", "Status update attempts"),
            &["status", "outcome"],
        )?;
        registry.register(Box::new(status_updates.clone()))?;

        let reconciliation_runs = IntCounterVec::new(
            Opts::new("reconciliation_runs_total", "Reconciliation sweeps"),
            &["scope", "outcome"],
        )?;
        registry.register(Box::new(reconciliation_runs.clone()))?;

        let reconciliation_patched = IntCounter::new(
            "reconciliation_patched_total",
            "Orders patched by reconciliation",
        )?;
        registry.register(Box::new(reconciliation_patched.clone()))?;

        let reconciliation_failed = IntCounter::new(
            "reconciliation_failed_patches_total",
            "Reconciliation patches that failed and were skipped",
        )?;
        registry.register(Box::new(reconciliation_failed.clone()))?;

        let store_call_duration = HistogramVec::new(
            HistogramOpts::new("order_store_call_duration_seconds", "Order store call duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_call_duration.clone()))?;

        let store_errors = IntCounterVec::new(
            Opts::new("order_store_errors_total", "Failed order store calls"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(store_errors.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            validation_failures,
            attribution_matches,
            status_updates,
            reconciliation_runs,
            reconciliation_patched,
            reconciliation_failed,
            store_call_duration,
            store_errors,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_validation_failure(&self, fields: &[&str]) {
        for field in fields {
            self.validation_failures.with_label_values(&[*field]).inc();
        }
    }

    pub fn record_attribution_match(&self, strategy: &str) {
        self.attribution_matches.with_label_values(&[strategy]).inc();
    }

    pub fn record_status_update(&self, status: OrderStatus, outcome: &str) {
        self.status_updates.with_label_values(&[status.as_str(), outcome]).inc();
    }

    pub fn record_reconciliation(&self, scope: &str, patched: usize, failed: usize, outcome: &str) {
        self.reconciliation_runs.with_label_values(&[scope, outcome]).inc();
        self.reconciliation_patched.inc_by(patched as u64);
        self.reconciliation_failed.inc_by(failed as u64);
    }

    pub fn record_store_call(&self, operation: &str, duration_secs: f64, error: Option<&StoreError>) {
        self.store_call_duration.with_label_values(&[operation]).observe(duration_secs);
        if let Some(error) = error {
            self.store_errors.with_label_values(&[operation, error.kind()]).inc();
        }
    }

    /// Stored documents a scan had to report instead of decode.
    pub fn record_unreadable_documents(&self, operation: &str, count: usize) {
        self.store_errors
            .with_label_values(&[operation, "corrupt"])
            .inc_by(count as u64);
    }

    pub fn store_error_count(&self, operation: &str, kind: &str) -> u64 {
        self.store_errors.with_label_values(&[operation, kind]).get()
    }
}
