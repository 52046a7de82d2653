//! Health-Check-Endpunkt fuer Hinterzimmer
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl lebender Verbindungen

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub verbindungen: usize,
}

/// Liefert die aktuelle Anzahl lebender Verbindungen
pub type VerbindungsZaehler = Arc<dyn Fn() -> usize + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    /// Ob der Relay-Listener laeuft
    pub relay_bereit: Arc<AtomicBool>,
    verbindungen: VerbindungsZaehler,
}

impl HealthState {
    pub fn neu(verbindungen: VerbindungsZaehler) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            relay_bereit: Arc::new(AtomicBool::new(false)),
            verbindungen,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn verbindungen(&self) -> usize {
        (self.verbindungen)()
    }

    pub fn bereit_setzen(&self, bereit: bool) {
        self.relay_bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn antwort(&self) -> HealthResponse {
        let status = if self.relay_bereit.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            verbindungen: self.verbindungen(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let antwort = state.antwort();
    let http_status = match antwort.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(antwort))
}
