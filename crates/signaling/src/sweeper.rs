//! Hintergrund-Sweep
//!
//! Ergaenzt den Sweep beim Verbindungsaufbau: trennt stille Verbindungen
//! auch dann, wenn niemand Neues kommt, raeumt abgelaufene Sperren weg und
//! fuehrt eine vorgemerkte Rotation aus, sobald der Relay leer ist.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server_state::SignalingState;

/// Startet den Sweep-Task
pub fn sweeper_starten(
    state: Arc<SignalingState>,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(intervall);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Erster Tick kommt sofort
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    state.veraltete_trennen();

                    let abgelaufen = state.bans.aufraeumen();
                    if abgelaufen > 0 {
                        tracing::debug!(anzahl = abgelaufen, "Abgelaufene Sperren entfernt");
                    }

                    // RSA-Erzeugung blockiert
                    let pflege = Arc::clone(&state);
                    if let Err(e) = tokio::task::spawn_blocking(move || pflege.identitaet_pflegen()).await {
                        tracing::error!(fehler = %e, "Identitaetspflege abgebrochen");
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Sweeper gestoppt");
    })
}
