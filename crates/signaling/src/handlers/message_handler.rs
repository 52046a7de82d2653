//! Nachrichten-Handler – Direkt- und Mehrfachweiterleitung
//!
//! Der Relay liest keine Nutzlasten. Er prueft nur, ob Absender und
//! Empfaenger aktive Mitglieder desselben Channels sind, und verpackt die
//! Nutzlast neu mit dem Schluessel des Empfaengers.

use hinterzimmer_core::{ChannelName, ConnectionId};
use hinterzimmer_protocol::ServerNachricht;

use crate::broadcast::verschluesselt_senden;
use crate::registry::RelayTabellen;
use crate::server_state::SignalingState;

/// Channel des Absenders, falls er einem beigetreten ist
fn absender_channel(tabellen: &RelayTabellen, absender: &ConnectionId) -> Option<ChannelName> {
    tabellen
        .get(absender)
        .and_then(|eintrag| eintrag.zustand.channel())
        .cloned()
}

/// Leitet eine Nutzlast an ein Mitglied im Channel des Absenders weiter
fn weiterleiten(
    tabellen: &RelayTabellen,
    channel: &ChannelName,
    absender: &ConnectionId,
    ziel: &str,
    payload: String,
) -> bool {
    let Some(empfaenger) = tabellen.aktives_mitglied(ziel, channel) else {
        tracing::trace!(verbindung = %absender, ziel, "Ziel nicht im Channel – verworfen");
        return false;
    };
    verschluesselt_senden(
        empfaenger,
        &ServerNachricht::Weitergeleitet {
            p: payload,
            c: absender.clone(),
        },
    )
}

/// Behandelt `c`
pub fn handle_direkt(
    state: &SignalingState,
    absender: &ConnectionId,
    ziel: &str,
    payload: String,
) -> bool {
    let tabellen = state.tabellen();
    let Some(channel) = absender_channel(&tabellen, absender) else {
        state.beobachter.verworfen("kein_channel");
        return false;
    };

    let zugestellt = weiterleiten(&tabellen, &channel, absender, ziel, payload);
    if zugestellt {
        state.beobachter.weitergeleitet(1);
    }
    zugestellt
}

/// Behandelt `w`
///
/// Gibt die Anzahl zugestellter Nutzlasten zurueck.
pub fn handle_rundruf(
    state: &SignalingState,
    absender: &ConnectionId,
    payloads: Vec<(String, String)>,
) -> usize {
    let tabellen = state.tabellen();
    let Some(channel) = absender_channel(&tabellen, absender) else {
        state.beobachter.verworfen("kein_channel");
        return 0;
    };

    let zugestellt = payloads
        .into_iter()
        .filter(|(ziel, payload)| weiterleiten(&tabellen, &channel, absender, ziel, payload.clone()))
        .count();

    if zugestellt > 0 {
        state.beobachter.weitergeleitet(zugestellt);
    }
    tracing::trace!(verbindung = %absender, zugestellt, "Rundruf verteilt");
    zugestellt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::channel_handler::handle_channel_join;
    use crate::registry::tests::test_schluessel;
    use crate::server_state::tests::{sichern, test_state};
    use crate::server_state::{NeueVerbindung, SignalingConfig};
    use hinterzimmer_protocol::entschluesseln;
    use serde_json::json;

    /// Registriert, sichert und (optional) tritt bei; leert das Postfach
    async fn mitglied(
        state: &SignalingState,
        n: u8,
        channel: Option<&ChannelName>,
    ) -> NeueVerbindung {
        let mut neu = state.verbindung_registrieren("10.0.0.1").unwrap();
        sichern(state, &neu.id, test_schluessel(n));
        if let Some(channel) = channel {
            handle_channel_join(state, &neu.id, channel);
        }
        while neu.postfach.empfaenger.try_recv().is_ok() {}
        neu
    }

    #[tokio::test]
    async fn direkt_an_channel_mitglied() {
        let state = test_state(SignalingConfig::default());
        let channel = ChannelName::neu("room1").unwrap();
        let a = mitglied(&state, 1, Some(&channel)).await;
        let mut b = mitglied(&state, 2, Some(&channel)).await;

        assert!(handle_direkt(&state, &a.id, b.id.as_str(), "HELLO".into()));

        let frame = b.postfach.empfaenger.recv().await.unwrap();
        assert_eq!(
            entschluesseln(&frame, &test_schluessel(2)).unwrap(),
            json!({"a": "c", "p": "HELLO", "c": a.id.as_str()})
        );
    }

    #[tokio::test]
    async fn direkt_ueber_channelgrenze_verworfen() {
        let state = test_state(SignalingConfig::default());
        let room1 = ChannelName::neu("room1").unwrap();
        let room2 = ChannelName::neu("room2").unwrap();
        let a = mitglied(&state, 1, Some(&room1)).await;
        let mut b = mitglied(&state, 2, Some(&room2)).await;
        let mut c = mitglied(&state, 3, None).await;

        assert!(!handle_direkt(&state, &a.id, b.id.as_str(), "x".into()));
        assert!(!handle_direkt(&state, &a.id, c.id.as_str(), "x".into()));
        assert!(!handle_direkt(&state, &a.id, "unbekannt", "x".into()));
        // Absender ohne Channel darf nichts senden
        assert!(!handle_direkt(&state, &c.id, a.id.as_str(), "x".into()));

        assert!(b.postfach.empfaenger.try_recv().is_err());
        assert!(c.postfach.empfaenger.try_recv().is_err());
    }

    #[tokio::test]
    async fn rundruf_nur_an_mitglieder() {
        let state = test_state(SignalingConfig::default());
        let room1 = ChannelName::neu("room1").unwrap();
        let room2 = ChannelName::neu("room2").unwrap();
        let a = mitglied(&state, 1, Some(&room1)).await;
        let mut b = mitglied(&state, 2, Some(&room1)).await;
        let mut c = mitglied(&state, 3, Some(&room1)).await;
        let mut d = mitglied(&state, 4, Some(&room2)).await;

        let zugestellt = handle_rundruf(
            &state,
            &a.id,
            vec![
                (b.id.as_str().to_string(), "P1".into()),
                (c.id.as_str().to_string(), "P2".into()),
                (d.id.as_str().to_string(), "P3".into()),
            ],
        );
        assert_eq!(zugestellt, 2);

        let frame = b.postfach.empfaenger.recv().await.unwrap();
        assert_eq!(entschluesseln(&frame, &test_schluessel(2)).unwrap()["p"], "P1");
        let frame = c.postfach.empfaenger.recv().await.unwrap();
        assert_eq!(entschluesseln(&frame, &test_schluessel(3)).unwrap()["p"], "P2");
        assert!(d.postfach.empfaenger.try_recv().is_err());
    }
}
