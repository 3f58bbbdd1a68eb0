//! Read-only admin HTTP endpoint: metrics, instance snapshot, liveness.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use registry::{InstanceView, RegistryMetrics, ServiceRegistry};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AdminState {
    registry: ServiceRegistry,
    metrics: Arc<RegistryMetrics>,
}

/// Optional filter for `/instances`
#[derive(Debug, Default, Deserialize)]
struct InstancesQuery {
    service: Option<String>,
}

/// HTTP server for the admin endpoint
pub struct AdminServer {
    state: AdminState,
}

impl AdminServer {
    pub fn new(registry: ServiceRegistry, metrics: Arc<RegistryMetrics>) -> Self {
        Self {
            state: AdminState { registry, metrics },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/instances", get(instances_handler))
            .route("/healthz", get(healthz_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        info!(listen_addr = %listener.local_addr()?, "Admin server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Admin server stopped");
        Ok(())
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AdminState>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for /instances endpoint, every record regardless of status
async fn instances_handler(
    State(state): State<AdminState>,
    Query(query): Query<InstancesQuery>,
) -> Json<Vec<InstanceView>> {
    let now = Instant::now();

    let mut views: Vec<InstanceView> = state
        .registry
        .list()
        .iter()
        .filter(|instance| {
            query
                .service
                .as_deref()
                .is_none_or(|service| instance.service_name == service)
        })
        .map(|instance| instance.view(now))
        .collect();
    views.sort_by(|a, b| {
        a.service_name
            .cmp(&b.service_name)
            .then_with(|| a.instance_id.cmp(&b.instance_id))
    });

    Json(views)
}

async fn healthz_handler() -> &'static str {
    "ok"
}
