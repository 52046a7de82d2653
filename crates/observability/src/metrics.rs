//! Prometheus-kompatible Metriken fuer Hinterzimmer
//!
//! Registrierte Metriken:
//! - `hinterzimmer_verbindungen` – Gauge: Lebende WebSocket-Verbindungen
//! - `hinterzimmer_channels_aktiv` – Gauge: Nicht-leere Channels
//! - `hinterzimmer_handshakes_total` – Counter: Handshakes (ergebnis)
//! - `hinterzimmer_frames_weitergeleitet_total` – Counter: Zugestellte Nutzlasten
//! - `hinterzimmer_frames_verworfen_total` – Counter: Verworfene Frames (grund)
//! - `hinterzimmer_verbindungen_verdraengt_total` – Counter: Zwangsweise getrennt

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Counter, Encoder, Gauge, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Hinterzimmer-Prometheus-Metriken
#[derive(Clone)]
pub struct HinterzimmerMetrics {
    pub registry: Arc<Registry>,

    // Relay-Zustand
    pub verbindungen: Gauge,
    pub channels_aktiv: Gauge,

    // Ereignisse
    pub handshakes_total: IntCounterVec,
    pub frames_weitergeleitet_total: Counter,
    pub frames_verworfen_total: IntCounterVec,
    pub verbindungen_verdraengt_total: Counter,
}

impl HinterzimmerMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Relay-Zustand ---
        let verbindungen = Gauge::with_opts(Opts::new(
            "hinterzimmer_verbindungen",
            "Anzahl lebender WebSocket-Verbindungen",
        ))?;
        registry.register(Box::new(verbindungen.clone()))?;

        let channels_aktiv = Gauge::with_opts(Opts::new(
            "hinterzimmer_channels_aktiv",
            "Anzahl nicht-leerer Channels",
        ))?;
        registry.register(Box::new(channels_aktiv.clone()))?;

        // --- Ereignisse ---
        let handshakes_total = IntCounterVec::new(
            Opts::new("hinterzimmer_handshakes_total", "Abgeschlossene Handshakes"),
            &["ergebnis"],
        )?;
        registry.register(Box::new(handshakes_total.clone()))?;

        let frames_weitergeleitet_total = Counter::with_opts(Opts::new(
            "hinterzimmer_frames_weitergeleitet_total",
            "An Channel-Mitglieder zugestellte Nutzlasten",
        ))?;
        registry.register(Box::new(frames_weitergeleitet_total.clone()))?;

        let frames_verworfen_total = IntCounterVec::new(
            Opts::new(
                "hinterzimmer_frames_verworfen_total",
                "Verworfene eingehende Frames",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(frames_verworfen_total.clone()))?;

        let verbindungen_verdraengt_total = Counter::with_opts(Opts::new(
            "hinterzimmer_verbindungen_verdraengt_total",
            "Durch Sweep oder Sperre getrennte Verbindungen",
        ))?;
        registry.register(Box::new(verbindungen_verdraengt_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen,
            channels_aktiv,
            handshakes_total,
            frames_weitergeleitet_total,
            frames_verworfen_total,
            verbindungen_verdraengt_total,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for HinterzimmerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HinterzimmerMetrics")
            .field("verbindungen", &self.verbindungen.get())
            .field("channels_aktiv", &self.channels_aktiv.get())
            .finish()
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: HinterzimmerMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<HinterzimmerMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
