//! # hinterzimmer-observability
//!
//! Observability-Crate fuer Hinterzimmer:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging (Text oder JSON) via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, HinterzimmerMetrics};
pub use middleware::request_timing_layer;

use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::watch;

/// Baut den Observability-Router (Metriken + Health)
pub fn observability_router(metriken: HinterzimmerMetrics, health: HealthState) -> axum::Router {
    axum::Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health))
        .layer(axum::middleware::from_fn(middleware::langsame_anfragen_melden))
        .layer(request_timing_layer())
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: HinterzimmerMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = observability_router(metriken, health);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}
