//! hinterzimmer-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod beobachter;
pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use beobachter::MetrikBeobachter;
use config::ServerConfig;
use hinterzimmer_crypto::{DateiSpeicher, FluechtigerSpeicher, IdentitaetsSpeicher, IdentitaetsVerwalter};
use hinterzimmer_observability::{observability_server_starten, HealthState, HinterzimmerMetrics};
use hinterzimmer_signaling::{SignalingServer, SignalingState, SpeicherBanStore};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut den Identitaets-Verwalter passend zur Konfiguration
    pub fn identitaets_verwalter(&self) -> IdentitaetsVerwalter {
        let speicher: Arc<dyn IdentitaetsSpeicher> = match &self.config.identitaet.speicher_pfad {
            Some(pfad) => Arc::new(DateiSpeicher::neu(pfad.clone())),
            None => Arc::new(FluechtigerSpeicher::neu()),
        };
        IdentitaetsVerwalter::neu(
            speicher,
            self.config.identitaet.rsa_bits,
            self.config.identitaet_max_alter(),
        )
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Server-Identitaet laden oder erzeugen (Fehler beendet den Prozess)
    /// 2. WebSocket-Listener binden
    /// 3. Observability-Server starten
    /// 4. Auf Ctrl-C warten, dann alle Tasks ueber den Watch-Kanal stoppen
    pub async fn starten(self) -> Result<()> {
        let ws_addr = self.config.ws_bind_adresse()?;
        let metriken = HinterzimmerMetrics::neu()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // RSA-Erzeugung blockiert
        let identitaeten = Arc::new(self.identitaets_verwalter());
        let laden = Arc::clone(&identitaeten);
        let identitaet = tokio::task::spawn_blocking(move || laden.laden_oder_erzeugen())
            .await?
            .context("Server-Identitaet konnte nicht geladen oder erzeugt werden")?;
        tracing::info!(erstellt_am = %identitaet.erstellt_am(), "Server-Identitaet bereit");

        let state = SignalingState::neu(
            self.config.signaling_config(),
            identitaeten,
            Arc::new(SpeicherBanStore::neu()),
            Arc::new(MetrikBeobachter::neu(metriken.clone())),
        );

        let listener = TcpListener::bind(ws_addr)
            .await
            .with_context(|| format!("WebSocket-Listener auf {ws_addr} nicht bindbar"))?;
        let relay = SignalingServer::neu(Arc::clone(&state), ws_addr)
            .mit_pfad(self.config.netzwerk.ws_pfad.clone());
        let mut relay_handle = tokio::spawn(relay.starten_mit_listener(listener, shutdown_rx.clone()));

        let zaehler_state = Arc::clone(&state);
        let health = HealthState::neu(Arc::new(move || zaehler_state.verbindungen_anzahl()));
        health.bereit_setzen(true);

        if self.config.observability.aktiviert {
            let obs_addr = self.config.observability_bind_adresse()?;
            let obs_rx = shutdown_rx.clone();
            let obs_health = health.clone();
            tokio::spawn(async move {
                if let Err(e) = observability_server_starten(obs_addr, metriken, obs_health, obs_rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        tracing::info!(
            relay = %ws_addr,
            pfad = %self.config.netzwerk.ws_pfad,
            moderation = self.config.relay.moderation_aktiviert,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            ergebnis = &mut relay_handle => {
                health.bereit_setzen(false);
                ergebnis?.context("WebSocket-Relay unerwartet beendet")?;
                return Ok(());
            }
        }

        health.bereit_setzen(false);
        let _ = shutdown_tx.send(true);
        relay_handle.await?.context("WebSocket-Relay mit Fehler beendet")?;
        tracing::info!("Server beendet");
        Ok(())
    }
}
