//! Moderations-Handler – `ban_ip` und `unban_ip`
//!
//! Der Relay prueft keine Berechtigung. Ob diese Aktionen ueberhaupt
//! angenommen werden, entscheidet `SignalingConfig::moderation_aktiviert`
//! im Dispatcher.

use std::sync::Arc;

use hinterzimmer_core::ConnectionId;
use hinterzimmer_protocol::{BanDetails, ServerNachricht};

use crate::broadcast::verschluesselt_senden;
use crate::server_state::SignalingState;

/// Quelle, fuer die keine Adresse ermittelt werden konnte
pub const UNBEKANNTE_QUELLE: &str = "unknown";

/// Quelladresse der Zielverbindung, sofern bekannt
fn ziel_quelle(state: &SignalingState, absender: &ConnectionId, ziel: &str) -> Option<String> {
    let tabellen = state.tabellen();
    let Some(ip) = tabellen.suchen(ziel).map(|eintrag| eintrag.quelle.clone()) else {
        tracing::debug!(verbindung = %absender, ziel, "Moderationsziel unbekannt");
        return None;
    };
    if ip == UNBEKANNTE_QUELLE {
        tracing::debug!(verbindung = %absender, ziel, "Moderationsziel ohne Adresse");
        return None;
    }
    Some(ip)
}

/// Behandelt `ban_ip`
///
/// Sperrt die Quelladresse der Zielverbindung, benachrichtigt jede
/// gesicherte Verbindung von dieser Adresse und trennt sie nach
/// `ban_trennung_verzoegerung`. Der Absender bekommt `ban_result`.
/// Gibt die gesperrte Adresse zurueck.
pub fn handle_ban_ip(
    state: &Arc<SignalingState>,
    absender: &ConnectionId,
    ziel: &str,
    dauer_min: u64,
    grund: &str,
) -> Option<String> {
    let ip = ziel_quelle(state, absender, ziel)?;
    state.bans.bannen(&ip, dauer_min, grund);

    let tabellen = state.tabellen();
    let gebannt = ServerNachricht::Gebannt {
        d: BanDetails {
            duration: dauer_min,
            reason: grund.to_string(),
        },
    };
    let betroffen = tabellen.nach_quelle(&ip);
    for id in &betroffen {
        if let Some(eintrag) = tabellen.get(id) {
            verschluesselt_senden(eintrag, &gebannt);
        }
    }

    if let Some(eintrag) = tabellen.get(absender) {
        verschluesselt_senden(
            eintrag,
            &ServerNachricht::BanErgebnis {
                s: true,
                ip: ip.clone(),
            },
        );
    }
    drop(tabellen);

    tracing::info!(
        verbindung = %absender,
        ip = %ip,
        dauer_min,
        betroffen = betroffen.len(),
        "Adresse gesperrt"
    );

    let state = Arc::clone(state);
    let verzoegerung = state.config.ban_trennung_verzoegerung;
    tokio::spawn(async move {
        tokio::time::sleep(verzoegerung).await;
        for id in betroffen {
            state.verbindung_trennen(&id);
        }
    });

    Some(ip)
}

/// Behandelt `unban_ip`
///
/// Hebt die Sperre der Quelladresse der Zielverbindung auf. Eine Antwort
/// gibt es nicht.
pub fn handle_unban_ip(state: &SignalingState, absender: &ConnectionId, ziel: &str) -> bool {
    let Some(ip) = ziel_quelle(state, absender, ziel) else {
        return false;
    };
    let bestand = state.bans.entbannen(&ip);
    tracing::info!(verbindung = %absender, ip = %ip, bestand, "Sperre aufgehoben");
    bestand
}
