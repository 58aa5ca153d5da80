use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_orders::config::AppConfig;
use storefront_orders::domain::order::{NewOrder, OrderItem, OrderStatus, ReconciliationScope};
use storefront_orders::metrics::{self, OrderMetrics};
use storefront_orders::service::{AdminOrderService, OrderService, RequestContext};
use storefront_orders::store::{OrderStore, ScyllaOrderStore, TimedOrderStore};
use storefront_orders::utils::{retry_with_backoff, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting storefront order service");

    let config = AppConfig::from_env()?;
    tracing::info!(
        nodes = ?config.scylla_nodes,
        keyspace = %config.keyspace,
        policy = ?config.status_policy,
        timeout_ms = config.store_timeout.as_millis(),
        "Configuration loaded"
    );

    // === 1. Create ScyllaDB session ===
    tracing::info!("Connecting to ScyllaDB...");
    let session: Session = retry_with_backoff(RetryConfig::aggressive(), |attempt| {
        let nodes = config.scylla_nodes.clone();
        async move {
            tracing::debug!(attempt, "Opening ScyllaDB session");
            SessionBuilder::new().known_nodes(nodes).build().await
        }
    })
    .await
    .into_result()?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                config.keyspace
            ),
            &[],
        )
        .await?;

    session.use_keyspace(&config.keyspace, false).await?;

    let session = Arc::new(session);

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(OrderMetrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // Metrics HTTP server runs on its own actix system in a background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, metrics_port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 3. Order store ===
    let scylla_store = ScyllaOrderStore::new(session.clone());
    scylla_store.ensure_schema().await?;

    let store: Arc<dyn OrderStore> = Arc::new(TimedOrderStore::new(
        Arc::new(scylla_store),
        config.store_timeout,
        metrics.clone(),
    ));

    let orders = OrderService::new(store.clone(), config.status_policy.build(), metrics.clone());
    let admin = AdminOrderService::new(store, metrics);

    // === 4. Demonstrate the order lifecycle ===
    tracing::info!("📝 Demonstrating order lifecycle");

    let customer = RequestContext::new("demo-user");
    let input = NewOrder {
        user_id: Some("demo-user".to_string()),
        items: vec![
            OrderItem {
                id: Some("prod-speaker".to_string()),
                name: "Bookshelf speaker".to_string(),
                price: 999.0,
                quantity: 1.0,
                seller_id: Some("seller-a".to_string()),
                ..OrderItem::default()
            },
            OrderItem {
                id: Some("prod-amp".to_string()),
                name: "Stereo amplifier".to_string(),
                price: 1499.0,
                quantity: 2.0,
                seller_id: Some("seller-b".to_string()),
                ..OrderItem::default()
            },
        ],
        total_amount: Some(3997.0),
        ..NewOrder::default()
    };

    let created = orders.create_order(&customer, input).await;
    let Some(created) = created.data else {
        anyhow::bail!("demo order was not created: {:?}", created.error);
    };
    tracing::info!("✅ Order created: {}", created.order_id);

    for seller in ["seller-a", "seller-b"] {
        let response = orders.get_seller_orders(&customer, seller).await;
        tracing::info!(
            seller_id = seller,
            count = response.data.as_ref().map_or(0, Vec::len),
            "Seller order listing"
        );
    }

    let response = orders
        .update_order_status(&customer, &created.order_id, OrderStatus::Processing)
        .await;
    tracing::info!(success = response.success, "✅ Order moved to processing");

    // === 5. Attribute legacy orders that carry no seller fields ===
    let operator = RequestContext::new("ops-demo");
    let cancel = CancellationToken::new();
    let repair = admin
        .reassign_seller(&operator, "seller-a", ReconciliationScope::Unattributed, &cancel)
        .await;
    match repair.data {
        Some(summary) => tracing::info!(
            fixed_count = summary.fixed_count,
            scanned_count = summary.scanned_count,
            "🔧 {}",
            summary.message
        ),
        None => tracing::warn!(error = ?repair.error, "Reconciliation failed"),
    }

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
