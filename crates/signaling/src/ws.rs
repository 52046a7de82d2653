//! WebSocket-Listener – Bindet Socket, nimmt Verbindungen an
//!
//! Der `SignalingServer` bedient einen axum-Router mit genau einer
//! WebSocket-Route. Jede angenommene Verbindung laeuft als eigener tokio-Task
//! mit einer `ClientConnection`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::handlers::moderation_handler::UNBEKANNTE_QUELLE;
use crate::server_state::SignalingState;
use crate::sweeper::sweeper_starten;

/// Proxy-Header in der Reihenfolge, in der sie ausgewertet werden
const PROXY_HEADER: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-client-ip"];

/// Ermittelt die Quelladresse einer Verbindung
///
/// Bei `proxy_vertrauen` gewinnt der erste Eintrag von `X-Forwarded-For`,
/// dann `X-Real-IP`, dann `X-Client-IP`. Sonst die Socket-Adresse, und ohne
/// die `"unknown"`.
pub fn quelle_ermitteln(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    proxy_vertrauen: bool,
) -> String {
    if proxy_vertrauen {
        let aus_header = PROXY_HEADER.iter().find_map(|name| {
            let wert = headers.get(*name)?.to_str().ok()?;
            let erster = wert.split(',').next()?.trim();
            (!erster.is_empty()).then(|| erster.to_string())
        });
        if let Some(quelle) = aus_header {
            return quelle;
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNBEKANNTE_QUELLE.to_string())
}

#[derive(Clone)]
struct WsZustand {
    signaling: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Baut den Router mit der WebSocket-Route unter `pfad`
pub fn ws_router(state: Arc<SignalingState>, pfad: &str, shutdown_rx: watch::Receiver<bool>) -> Router {
    Router::new().route(pfad, get(ws_upgrade)).with_state(WsZustand {
        signaling: state,
        shutdown_rx,
    })
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(zustand): State<WsZustand>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let quelle = quelle_ermitteln(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        zustand.signaling.config.proxy_header_vertrauen,
    );
    ws.on_upgrade(move |socket| verbindung_starten(zustand, socket, quelle))
}

async fn verbindung_starten(zustand: WsZustand, socket: WebSocket, quelle: String) {
    match ClientConnection::annehmen_blockierfrei(zustand.signaling, quelle).await {
        Ok((verbindung, postfach)) => {
            verbindung
                .verarbeiten(socket, postfach, zustand.shutdown_rx)
                .await;
        }
        Err(e) => {
            tracing::info!(fehler = %e, "Verbindung abgelehnt");
            let _ = socket.close().await;
        }
    }
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
    pfad: String,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer auf dem Pfad `/`
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self {
            state,
            bind_addr,
            pfad: "/".to_string(),
        }
    }

    /// Setzt den Pfad der WebSocket-Route
    pub fn mit_pfad(mut self, pfad: impl Into<String>) -> Self {
        self.pfad = pfad.into();
        self
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bindet den Listener und bedient Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.starten_mit_listener(listener, shutdown_rx).await
    }

    /// Wie `starten`, aber mit bereits gebundenem Listener
    pub async fn starten_mit_listener(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        let router = ws_router(Arc::clone(&self.state), &self.pfad, shutdown_rx.clone());

        let sweeper = self
            .state
            .config
            .sweep_intervall
            .map(|intervall| sweeper_starten(Arc::clone(&self.state), intervall, shutdown_rx.clone()));

        tracing::info!(adresse = %lokale_addr, pfad = %self.pfad, "WebSocket-Relay gestartet");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            tracing::info!("Relay: Shutdown-Signal empfangen");
        })
        .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("WebSocket-Relay gestoppt");
        Ok(())
    }
}
