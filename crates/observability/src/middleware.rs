//! HTTP-Tracing fuer den Observability-Server

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// TraceLayer mit einem Span pro Anfrage und Antwortzeit in Millisekunden
pub fn request_timing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::DEBUG)
                .latency_unit(tower_http::LatencyUnit::Millis),
        )
}

/// Warnt bei Scrapes, die laenger als eine Sekunde brauchen
pub async fn langsame_anfragen_melden(req: Request<Body>, next: Next) -> Response {
    let pfad = req.uri().path().to_owned();
    let start = Instant::now();
    let antwort = next.run(req).await;

    let dauer = start.elapsed();
    if dauer.as_secs() >= 1 {
        tracing::warn!(pfad = %pfad, dauer_ms = dauer.as_millis() as u64, "Langsame Observability-Anfrage");
    }
    antwort
}
