// HTTP server for metrics and governor state
//
// Listens on 0.0.0.0:<port> (default 9090):
// - /metrics          Prometheus text format
// - /health           liveness
// - /governor         dashboard JSON
// - /usage/{tenant}   per-tenant usage JSON

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::governor::{DashboardBuilder, Governor, Resource, UsageSnapshot};
use crate::metrics;

/// Per-tenant usage response
#[derive(Debug, Serialize)]
struct TenantUsageResponse {
    tenant_id: String,
    tracked: bool,
    usage: BTreeMap<Resource, UsageSnapshot>,
}

/// Build the HTTP router
///
/// `/metrics` is only mounted when `metrics_enabled` is set.
pub fn router(governor: Governor, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/governor", get(dashboard_handler))
        .route("/usage/{tenant}", get(usage_handler));

    if metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(TraceLayer::new_for_http()).with_state(governor)
}

/// Start the HTTP server and serve until the process stops
pub async fn start_server(port: u16, governor: Governor, metrics_enabled: bool) -> Result<()> {
    if metrics_enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let app = router(governor, metrics_enabled);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting governor HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind governor HTTP server")?;

    axum::serve(listener, app)
        .await
        .context("Governor HTTP server error")?;

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn dashboard_handler(State(governor): State<Governor>) -> impl IntoResponse {
    Json(DashboardBuilder::new(&governor).build())
}

async fn usage_handler(
    State(governor): State<Governor>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    Json(TenantUsageResponse {
        tracked: governor.quota().store().has_tenant(&tenant),
        usage: governor.quota().get_usage(&tenant),
        tenant_id: tenant,
    })
}
