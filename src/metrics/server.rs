use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

// ============================================================================
// Metrics Exporter - scrape and liveness endpoints for the order service
// ============================================================================
//
//   GET /metrics  -> Prometheus text exposition of the OrderMetrics registry
//   GET /health   -> {"status":"healthy","service":...,"version":...}
//
// The exporter runs its own actix System; main.rs gives it a dedicated
// thread so the order service's tokio runtime never drives actix futures.
//
// ============================================================================

/// Serve the order metrics registry on `0.0.0.0:port` until the process exits.
pub async fn start_metrics_server(registry: Arc<Registry>, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Order metrics exporter listening on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || App::new().configure(routes(registry.clone())))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}

fn routes(registry: Arc<Registry>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(registry))
            .route("/metrics", web::get().to(scrape))
            .route("/health", web::get().to(health));
    }
}

async fn scrape(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Could not encode order metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "storefront-orders",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
